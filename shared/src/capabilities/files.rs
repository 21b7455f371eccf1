use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_IMAGE_SIZE_BYTES: u64 = 20 * 1024 * 1024;

/// Reads uploaded files the shell holds on to.
#[derive(Clone)]
pub struct Files<E> {
    context: CapabilityContext<FilesOperation, E>,
}

impl<Ev> Capability<Ev> for Files<Ev> {
    type Operation = FilesOperation;
    type MappedSelf<MappedEv> = Files<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Files::new(self.context.map_event(f))
    }
}

impl<E> Files<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<FilesOperation, E>) -> Self {
        Self { context }
    }

    pub fn read<F>(&self, handle_id: impl Into<String>, callback: F)
    where
        F: FnOnce(FileResult) -> E + Send + 'static,
    {
        let ctx = self.context.clone();
        let handle_id = handle_id.into();
        self.context.spawn(async move {
            let result = ctx
                .request_from_shell(FilesOperation::Read { handle_id })
                .await;
            ctx.update_app(callback(result.and_then(FileContents::validated)));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilesOperation {
    Read { handle_id: String },
}

impl Operation for FilesOperation {
    type Output = FileResult;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContents {
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl FileContents {
    fn validated(self) -> Result<Self, FileError> {
        if self.bytes.is_empty() {
            return Err(FileError::Empty);
        }
        let size = self.bytes.len() as u64;
        if size > MAX_IMAGE_SIZE_BYTES {
            return Err(FileError::TooLarge {
                size,
                max: MAX_IMAGE_SIZE_BYTES,
            });
        }
        Ok(self)
    }
}

// Don't dump image bytes into logs.
impl std::fmt::Debug for FileContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContents")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileError {
    #[error("file not found: {handle_id}")]
    NotFound { handle_id: String },

    #[error("file could not be read: {reason}")]
    Unreadable { reason: String },

    #[error("file is empty")]
    Empty,

    #[error("file too large: {size} bytes, max {max}")]
    TooLarge { size: u64, max: u64 },
}

pub type FileResult = Result<FileContents, FileError>;
