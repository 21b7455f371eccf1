use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::PlaybackToken;

/// Microphone capture and PCM playback. Decoding and output devices are the
/// shell's business; the core only hands over bytes and tokens.
#[derive(Clone)]
pub struct Audio<E> {
    context: CapabilityContext<AudioOperation, E>,
}

impl<Ev> Capability<Ev> for Audio<Ev> {
    type Operation = AudioOperation;
    type MappedSelf<MappedEv> = Audio<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Audio::new(self.context.map_event(f))
    }
}

impl<E> Audio<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<AudioOperation, E>) -> Self {
        Self { context }
    }

    pub fn start_recording<F>(&self, callback: F)
    where
        F: FnOnce(Result<(), AudioError>) -> E + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx
                .request_from_shell(AudioOperation::StartRecording)
                .await
                .and_then(|output| match output {
                    AudioOutput::RecordingStarted => Ok(()),
                    other => Err(AudioError::UnexpectedOutput(format!("{other:?}"))),
                });
            ctx.update_app(callback(result));
        });
    }

    pub fn stop_recording<F>(&self, callback: F)
    where
        F: FnOnce(Result<RecordedAudio, AudioError>) -> E + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx
                .request_from_shell(AudioOperation::StopRecording)
                .await
                .and_then(|output| match output {
                    AudioOutput::Recorded(audio) => Ok(audio),
                    other => Err(AudioError::UnexpectedOutput(format!("{other:?}"))),
                });
            ctx.update_app(callback(result));
        });
    }

    /// Resolves once playback under `token` ends, naturally or because it
    /// was stopped.
    pub fn play<F>(&self, token: PlaybackToken, clip: PcmClip, callback: F)
    where
        F: FnOnce(Result<(), AudioError>) -> E + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx
                .request_from_shell(AudioOperation::Play { token, clip })
                .await
                .map(|_| ());
            ctx.update_app(callback(result));
        });
    }

    pub fn stop(&self, token: PlaybackToken) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(AudioOperation::Stop { token }).await;
        });
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PcmClip {
    pub sample_rate: u32,
    pub channels: u16,
    /// Signed 16-bit little-endian samples.
    #[serde(with = "serde_bytes")]
    pub samples: Vec<u8>,
}

impl std::fmt::Debug for PcmClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmClip")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("len", &self.samples.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioOperation {
    StartRecording,
    StopRecording,
    Play { token: PlaybackToken, clip: PcmClip },
    Stop { token: PlaybackToken },
}

impl Operation for AudioOperation {
    type Output = AudioResult;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedAudio {
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for RecordedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordedAudio")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioOutput {
    RecordingStarted,
    Recorded(RecordedAudio),
    PlaybackEnded,
    Stopped,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioError {
    #[error("microphone access denied")]
    PermissionDenied,

    #[error("audio device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("no recording in progress")]
    NotRecording,

    #[error("playback failed: {reason}")]
    Playback { reason: String },

    #[error("unexpected shell output: {0}")]
    UnexpectedOutput(String),
}

pub type AudioResult = Result<AudioOutput, AudioError>;
