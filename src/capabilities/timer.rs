use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// One-shot delay resolved by the shell. The poll cadence is built from
/// these instead of a standing interval so backoff can stretch each gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerOperation {
    pub millis: u64,
}

impl Operation for TimerOperation {
    type Output = ();
}

pub struct PollTimer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Capability<Ev> for PollTimer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = PollTimer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        PollTimer::new(self.context.map_event(f))
    }
}

impl<Ev> PollTimer<Ev>
where
    Ev: Send + 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn after(&self, millis: u64, event: Ev) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context.request_from_shell(TimerOperation { millis }).await;
            context.update_app(event);
        });
    }
}
