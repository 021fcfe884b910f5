use crux_core::capability::{Capability, CapabilityContext, Operation};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Shell-side socket contract: `Connect` opens (or replaces) the contract
/// socket and resolves repeatedly with lifecycle events and raw inbound
/// frames; `Send` and `Close` are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data")]
pub enum SocketOperation {
    Connect { url: String },
    Send { frame: String },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SocketEvent {
    Opened,
    /// Raw JSON text frame; decoded once by the core, malformed frames are
    /// logged and dropped.
    Frame(String),
    Error { message: String },
    Closed,
}

impl Operation for SocketOperation {
    type Output = SocketEvent;
}

pub struct ContractSocket<Ev> {
    context: CapabilityContext<SocketOperation, Ev>,
}

impl<Ev> Capability<Ev> for ContractSocket<Ev> {
    type Operation = SocketOperation;
    type MappedSelf<MappedEv> = ContractSocket<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        ContractSocket::new(self.context.map_event(f))
    }
}

impl<Ev> ContractSocket<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<SocketOperation, Ev>) -> Self {
        Self { context }
    }

    /// Opens the socket; every lifecycle event and inbound frame is handed
    /// back to the app through `make_event`. The stream ends when the shell
    /// tears the connection down.
    pub fn connect<F>(&self, url: String, make_event: F)
    where
        F: Fn(SocketEvent) -> Ev + Send + Sync + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let mut events = context.stream_from_shell(SocketOperation::Connect { url });
            while let Some(event) = events.next().await {
                context.update_app(make_event(event));
            }
        });
    }

    pub fn send(&self, frame: String) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context.notify_shell(SocketOperation::Send { frame }).await;
        });
    }

    pub fn close(&self) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context.notify_shell(SocketOperation::Close).await;
        });
    }
}
