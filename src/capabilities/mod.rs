mod http;
mod socket;
mod timer;

pub use self::http::{Endpoints, HttpCapability};
pub use self::socket::{ContractSocket, SocketEvent, SocketOperation};
pub use self::timer::{PollTimer, TimerOperation};

pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::event::Event;

pub type AppHttp = Http<Event>;
pub type AppRender = Render<Event>;
pub type AppSocket = ContractSocket<Event>;
pub type AppTimer = PollTimer<Event>;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub render: Render<Event>,
    pub socket: ContractSocket<Event>,
    pub timer: PollTimer<Event>,
}
