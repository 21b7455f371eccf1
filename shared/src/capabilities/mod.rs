mod audio;
mod export;
mod files;
mod timer;

pub use self::audio::{
    Audio, AudioError, AudioOperation, AudioOutput, AudioResult, PcmClip, RecordedAudio,
};
pub use self::export::{Export, ExportFile, ExportOperation};
pub use self::files::{FileContents, FileError, FileResult, Files, FilesOperation};
pub use self::timer::{Timer, TimerOperation, TimerOutput};

// Render and Http come straight from Crux; the rest are shell-side
// collaborators described by their operation enums.
pub use crux_core::render::Render;
pub use crux_http::Http;

use crux_core::bridge::ResolveSerialized;
use crux_core::capability::ProtoContext;
use crux_core::render::RenderOperation;
use crux_core::{Request, WithContext};
use crux_http::protocol::HttpRequest;
use serde::Serialize;

use crate::app::App;
use crate::event::Event;

pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub timer: Timer<Event>,
    pub files: Files<Event>,
    pub audio: Audio<Event>,
    pub export: Export<Event>,
}

// Wired by hand: the `Effect` derive shipped with crux_macros 0.3.10 emits
// `WithContext<Event, Effect>`, while crux_core 0.7 expects the app type.
#[derive(Debug)]
pub enum Effect {
    Render(Request<RenderOperation>),
    Http(Request<HttpRequest>),
    Timer(Request<TimerOperation>),
    Files(Request<FilesOperation>),
    Audio(Request<AudioOperation>),
    Export(Request<ExportOperation>),
}

/// What the shell receives across the bridge.
#[derive(Serialize)]
#[serde(rename = "Effect")]
pub enum EffectFfi {
    Render(RenderOperation),
    Http(HttpRequest),
    Timer(TimerOperation),
    Files(FilesOperation),
    Audio(AudioOperation),
    Export(ExportOperation),
}

impl crux_core::Effect for Effect {
    type Ffi = EffectFfi;

    fn serialize(self) -> (Self::Ffi, ResolveSerialized) {
        match self {
            Self::Render(request) => request.serialize(EffectFfi::Render),
            Self::Http(request) => request.serialize(EffectFfi::Http),
            Self::Timer(request) => request.serialize(EffectFfi::Timer),
            Self::Files(request) => request.serialize(EffectFfi::Files),
            Self::Audio(request) => request.serialize(EffectFfi::Audio),
            Self::Export(request) => request.serialize(EffectFfi::Export),
        }
    }
}

impl WithContext<App, Effect> for Capabilities {
    fn new_with_context(context: ProtoContext<Effect, Event>) -> Self {
        Self {
            render: Render::new(context.specialize(Effect::Render)),
            http: Http::new(context.specialize(Effect::Http)),
            timer: Timer::new(context.specialize(Effect::Timer)),
            files: Files::new(context.specialize(Effect::Files)),
            audio: Audio::new(context.specialize(Effect::Audio)),
            export: Export::new(context.specialize(Effect::Export)),
        }
    }
}
