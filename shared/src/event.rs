use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::{AudioError, FileContents, FileError, PcmClip, RecordedAudio};
use crate::gemini::{ChatReply, ServiceError};
use crate::model::{AnalysisResult, BatchId, ImageHandle, MessageId, ViewMode};

// --- API key wrapper: redacts Debug ---

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(
            ::serde::Serialize, ::serde::Deserialize, Clone, Debug, PartialEq, Eq, Hash,
        )]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4().to_string())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub(crate) use typed_id;

typed_id!(ChatRequestId);
typed_id!(PlaybackToken);

// --- Configuration handed over by the shell ---

/// Everything but the key is optional; missing values fall back to the
/// crate defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServiceSettings {
    pub api_key: ApiKey,
    pub base_url: Option<String>,
    pub analysis_model: Option<String>,
    pub chat_model: Option<String>,
    pub transcription_model: Option<String>,
    pub speech_model: Option<String>,
    pub voice: Option<String>,
    pub cost_per_million_tokens: Option<f64>,
    pub settle_delay_ms: Option<u64>,
}

impl ServiceSettings {
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: ApiKey::new(key),
            base_url: None,
            analysis_model: None,
            chat_model: None,
            transcription_model: None,
            speech_model: None,
            voice: None,
            cost_per_million_tokens: None,
            settle_delay_ms: None,
        }
    }
}

// --- Event enum ---
//
// Variants marked `#[serde(skip)]` are produced by capability callbacks
// inside the core and never cross the FFI boundary.

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    Configure(Box<ServiceSettings>),

    // Upload & Processing
    FilesSelected(Vec<ImageHandle>),
    NewAnalysisRequested,

    #[serde(skip)]
    ImageRead {
        batch_id: BatchId,
        index: usize,
        result: Result<FileContents, FileError>,
    },
    #[serde(skip)]
    ProgressTick { batch_id: BatchId, generation: u64 },
    #[serde(skip)]
    AnalysisCompleted {
        batch_id: BatchId,
        result: Result<Box<AnalysisResult>, ServiceError>,
    },
    #[serde(skip)]
    SettleElapsed { batch_id: BatchId },

    // Dashboard
    ViewModeSelected(ViewMode),
    SpeciesToggled { species_name: String },
    SelectionCleared,
    ExportRequested,

    // Chat
    ChatToggled,
    ChatSubmitted { text: String },
    MicToggled,
    SpeakRequested { message_id: MessageId },

    #[serde(skip)]
    ChatReplied {
        request_id: ChatRequestId,
        result: Result<ChatReply, ServiceError>,
    },
    #[serde(skip)]
    RecordingStarted {
        batch_id: BatchId,
        result: Result<(), AudioError>,
    },
    #[serde(skip)]
    RecordingFinished {
        batch_id: BatchId,
        result: Result<RecordedAudio, AudioError>,
    },
    #[serde(skip)]
    TranscriptionCompleted {
        batch_id: BatchId,
        result: Result<String, ServiceError>,
    },
    #[serde(skip)]
    SpeechSynthesized {
        token: PlaybackToken,
        result: Result<PcmClip, ServiceError>,
    },
    #[serde(skip)]
    PlaybackEnded { token: PlaybackToken },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Configure(_) => "configure",
            Self::FilesSelected(_) => "files_selected",
            Self::NewAnalysisRequested => "new_analysis_requested",
            Self::ImageRead { .. } => "image_read",
            Self::ProgressTick { .. } => "progress_tick",
            Self::AnalysisCompleted { .. } => "analysis_completed",
            Self::SettleElapsed { .. } => "settle_elapsed",
            Self::ViewModeSelected(_) => "view_mode_selected",
            Self::SpeciesToggled { .. } => "species_toggled",
            Self::SelectionCleared => "selection_cleared",
            Self::ExportRequested => "export_requested",
            Self::ChatToggled => "chat_toggled",
            Self::ChatSubmitted { .. } => "chat_submitted",
            Self::MicToggled => "mic_toggled",
            Self::SpeakRequested { .. } => "speak_requested",
            Self::ChatReplied { .. } => "chat_replied",
            Self::RecordingStarted { .. } => "recording_started",
            Self::RecordingFinished { .. } => "recording_finished",
            Self::TranscriptionCompleted { .. } => "transcription_completed",
            Self::SpeechSynthesized { .. } => "speech_synthesized",
            Self::PlaybackEnded { .. } => "playback_ended",
        }
    }
}
