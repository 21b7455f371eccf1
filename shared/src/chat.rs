//! Conversation state for one analysis session.
//!
//! At most one chat request and one playback are live at a time. Both are held
//! as owned handles (`Option`) that every completion path takes back out, so
//! a late completion for a superseded request or token finds nothing to
//! clear and is dropped.

use serde::{Deserialize, Serialize};

use crate::event::{ChatRequestId, PlaybackToken};
use crate::gemini::{ChatReply, ServiceError};
use crate::model::{ChatMessage, ChatSender, MessageId};

pub const CHAT_FAILURE_TEXT: &str = "Übertragung fehlgeschlagen. Bitte wiederholen.";

/// A request the caller must now send to the chat service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingChat {
    pub request_id: ChatRequestId,
    /// Conversation before `message`.
    pub history: Vec<ChatMessage>,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Synthesizing,
    Playing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackHandle {
    pub message_id: MessageId,
    pub token: PlaybackToken,
    pub state: PlaybackState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeakAction {
    /// The message was already speaking; its playback is released.
    Stopped(PlaybackHandle),
    /// Synthesize `text` under `token`, after releasing `stopped` if any.
    Start {
        stopped: Option<PlaybackHandle>,
        token: PlaybackToken,
        text: String,
    },
    /// No such message.
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MicState {
    #[default]
    Idle,
    Requesting,
    Listening,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MicAction {
    StartRecording,
    StopRecording,
    Ignored,
}

/// Resources that were live when the session ended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Released {
    pub playback: Option<PlaybackToken>,
    pub recording: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    in_flight: Option<ChatRequestId>,
    mic: MicState,
    transcribing: bool,
    speaking: Option<PlaybackHandle>,
}

impl ChatSession {
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<&ChatRequestId> {
        self.in_flight.as_ref()
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.transcribing
    }

    #[must_use]
    pub const fn mic(&self) -> MicState {
        self.mic
    }

    #[must_use]
    pub fn speaking(&self) -> Option<&PlaybackHandle> {
        self.speaking.as_ref()
    }

    /// Appends the user's message and hands back the request to send, or
    /// `None` when the text is blank or a request or transcription is
    /// outstanding.
    pub fn send_message(&mut self, text: &str) -> Option<PendingChat> {
        if text.trim().is_empty() || self.is_busy() {
            return None;
        }
        let history = self.messages.clone();
        let request_id = ChatRequestId::generate();
        self.messages.push(ChatMessage::user(text));
        self.in_flight = Some(request_id.clone());
        Some(PendingChat {
            request_id,
            history,
            message: text.to_owned(),
        })
    }

    /// Records the outcome of `request_id`. A failure becomes a fixed
    /// assistant message. Returns `false` for a request that is not the one
    /// outstanding.
    pub fn receive_reply(
        &mut self,
        request_id: &ChatRequestId,
        result: Result<ChatReply, ServiceError>,
    ) -> bool {
        if self.in_flight.as_ref() != Some(request_id) {
            return false;
        }
        self.in_flight = None;
        let message = match result {
            Ok(reply) => ChatMessage::assistant(reply.text, reply.sources),
            Err(_) => ChatMessage::assistant(CHAT_FAILURE_TEXT, None),
        };
        self.messages.push(message);
        true
    }

    pub fn toggle_mic(&mut self) -> MicAction {
        match self.mic {
            MicState::Idle => {
                self.mic = MicState::Requesting;
                MicAction::StartRecording
            }
            MicState::Requesting => MicAction::Ignored,
            MicState::Listening => {
                self.mic = MicState::Idle;
                MicAction::StopRecording
            }
        }
    }

    /// `granted` is false when the microphone could not be opened; the mic
    /// goes back to idle.
    pub fn recording_started(&mut self, granted: bool) {
        if self.mic == MicState::Requesting {
            self.mic = if granted {
                MicState::Listening
            } else {
                MicState::Idle
            };
        }
    }

    pub fn begin_transcription(&mut self) {
        self.transcribing = true;
    }

    pub fn end_transcription(&mut self) {
        self.transcribing = false;
    }

    pub fn speak(&mut self, message_id: &MessageId) -> SpeakAction {
        let Some(text) = self
            .messages
            .iter()
            .find(|m| &m.id == message_id && m.sender == ChatSender::Assistant)
            .map(|m| m.text.clone())
        else {
            return SpeakAction::Ignored;
        };

        let stopped = self.speaking.take();
        if let Some(active) = stopped.as_ref() {
            if &active.message_id == message_id {
                return SpeakAction::Stopped(active.clone());
            }
        }

        let token = PlaybackToken::generate();
        self.speaking = Some(PlaybackHandle {
            message_id: message_id.clone(),
            token: token.clone(),
            state: PlaybackState::Synthesizing,
        });
        SpeakAction::Start {
            stopped,
            token,
            text,
        }
    }

    /// Audio for `token` is ready. Returns `false` if the token was
    /// superseded in the meantime.
    pub fn audio_ready(&mut self, token: &PlaybackToken) -> bool {
        match self.speaking.as_mut() {
            Some(handle) if &handle.token == token => {
                handle.state = PlaybackState::Playing;
                true
            }
            _ => false,
        }
    }

    /// Clears the speaking marker if `token` still owns it. Used for both
    /// natural end of playback and synthesis failure.
    pub fn release_playback(&mut self, token: &PlaybackToken) -> bool {
        if self.speaking.as_ref().is_some_and(|h| &h.token == token) {
            self.speaking = None;
            true
        } else {
            false
        }
    }

    /// Ends the session, handing back whatever the shell still has running.
    pub fn close(&mut self) -> Released {
        let released = Released {
            playback: self
                .speaking
                .take()
                .filter(|h| h.state == PlaybackState::Playing)
                .map(|h| h.token),
            recording: self.mic == MicState::Listening,
        };
        *self = Self::default();
        released
    }
}
