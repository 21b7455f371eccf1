use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Hands a finished file to the shell, which offers it as a download.
#[derive(Clone)]
pub struct Export<E> {
    context: CapabilityContext<ExportOperation, E>,
}

impl<Ev> Capability<Ev> for Export<Ev> {
    type Operation = ExportOperation;
    type MappedSelf<MappedEv> = Export<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Export::new(self.context.map_event(f))
    }
}

impl<E> Export<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<ExportOperation, E>) -> Self {
        Self { context }
    }

    pub fn save(&self, file: ExportFile) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(ExportOperation::Save(file)).await;
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub mime_type: String,
    pub contents: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportOperation {
    Save(ExportFile),
}

impl Operation for ExportOperation {
    type Output = ();
}
