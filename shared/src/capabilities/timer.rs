use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// One-shot timers keyed by id. Starting an id that is already pending
/// replaces it on the shell side.
#[derive(Clone)]
pub struct Timer<E> {
    context: CapabilityContext<TimerOperation, E>,
}

impl<Ev> Capability<Ev> for Timer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = Timer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Timer::new(self.context.map_event(f))
    }
}

impl<E> Timer<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, E>) -> Self {
        Self { context }
    }

    pub fn start<F>(&self, id: impl Into<String>, millis: u64, callback: F)
    where
        F: FnOnce(TimerOutput) -> E + Send + 'static,
    {
        let ctx = self.context.clone();
        let id = id.into();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(TimerOperation::Start { id, millis })
                .await;
            ctx.update_app(callback(output));
        });
    }

    pub fn clear(&self, id: impl Into<String>) {
        let ctx = self.context.clone();
        let id = id.into();
        self.context.spawn(async move {
            ctx.notify_shell(TimerOperation::Clear { id }).await;
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOperation {
    Start { id: String, millis: u64 },
    Clear { id: String },
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOutput {
    Elapsed,
    Cleared,
}
