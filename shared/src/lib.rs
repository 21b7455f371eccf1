// lib.rs - Camera-trap review core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod chat;
pub mod event;
pub mod filter;
pub mod gemini;
pub mod model;
pub mod progress;
pub mod report;
pub mod screen;
pub mod view;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use event::Event;
pub use model::Model;
pub use view::ViewModel;

pub const SETTLE_DELAY: Duration = Duration::from_millis(800);
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Fenrir";
pub const DEFAULT_COST_PER_MILLION_TOKENS: f64 = 2.00;
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
pub const SPEECH_CHANNELS: u16 = 1;
pub const RECORDING_MIME_TYPE: &str = "audio/webm";
pub const DEFAULT_AREA_LABEL: &str = "Revier Nord";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AnalysisFailure,
    ChatFailure,
    TranscriptionFailure,
    SynthesisFailure,
    MicAccessDenied,
    Configuration,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AnalysisFailure => "ANALYSIS_FAILURE",
            Self::ChatFailure => "CHAT_FAILURE",
            Self::TranscriptionFailure => "TRANSCRIPTION_FAILURE",
            Self::SynthesisFailure => "SYNTHESIS_FAILURE",
            Self::MicAccessDenied => "MIC_ACCESS_DENIED",
            Self::Configuration => "CONFIGURATION_ERROR",
        }
    }

    /// Failures that never reach the user as a message; they are logged and
    /// the requested action is dropped.
    #[must_use]
    pub const fn is_silent(self) -> bool {
        matches!(
            self,
            Self::TranscriptionFailure | Self::SynthesisFailure | Self::MicAccessDenied
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("[{}] {message}", kind.code())]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::AnalysisFailure => "System Failure: Analysis module crashed.".into(),
            ErrorKind::ChatFailure => "Übertragung fehlgeschlagen. Bitte wiederholen.".into(),
            ErrorKind::Configuration => {
                "System Failure: no API key configured for the analysis service.".into()
            }
            ErrorKind::TranscriptionFailure
            | ErrorKind::SynthesisFailure
            | ErrorKind::MicAccessDenied => self.message.clone(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
