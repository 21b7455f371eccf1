//! Upload → Processing → Analysis, and back.
//!
//! `transition` is a pure function of the current screen and one event. Events
//! that make no sense for the current screen leave it untouched. `Analysis`
//! can only be built from a `Processing` screen that holds a result.

use crate::chat::ChatSession;
use crate::gemini::InlineData;
use crate::model::{AnalysisResult, Batch, ViewMode};
use crate::progress::{ProgressConfig, ProgressSimulator};
use crate::report::ProcessingLog;
use crate::AppError;

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessingScreen {
    pub batch: Batch,
    pub progress: ProgressSimulator,
    pub log: ProcessingLog,
    staged: Vec<Option<InlineData>>,
    ready: Option<Vec<InlineData>>,
    outcome: Option<Box<AnalysisResult>>,
}

impl ProcessingScreen {
    fn new(batch: Batch, config: &ProgressConfig) -> Self {
        let mut log = ProcessingLog::default();
        log.record(0.0);
        Self {
            staged: vec![None; batch.len()],
            batch,
            progress: ProgressSimulator::new(config.clone()),
            log,
            ready: None,
            outcome: None,
        }
    }

    fn record_progress(&mut self) {
        self.log.record(self.progress.value());
    }

    /// Images encoded and ready to send, handed out exactly once.
    pub fn take_ready(&mut self) -> Option<Vec<InlineData>> {
        self.ready.take()
    }

    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.staged.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&AnalysisResult> {
        self.outcome.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisScreen {
    pub batch: Batch,
    pub result: Box<AnalysisResult>,
    pub view_mode: ViewMode,
    pub selected_species: Option<String>,
    pub show_chat: bool,
    pub chat: ChatSession,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    Upload { error: Option<AppError> },
    Processing(Box<ProcessingScreen>),
    Analysis(Box<AnalysisScreen>),
}

impl Default for Screen {
    fn default() -> Self {
        Self::Upload { error: None }
    }
}

impl Screen {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::Processing(_) => "processing",
            Self::Analysis(_) => "analysis",
        }
    }

    #[must_use]
    pub fn processing(&self) -> Option<&ProcessingScreen> {
        match self {
            Self::Processing(p) => Some(p),
            _ => None,
        }
    }

    pub fn processing_mut(&mut self) -> Option<&mut ProcessingScreen> {
        match self {
            Self::Processing(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn analysis(&self) -> Option<&AnalysisScreen> {
        match self {
            Self::Analysis(a) => Some(a),
            _ => None,
        }
    }

    pub fn analysis_mut(&mut self) -> Option<&mut AnalysisScreen> {
        match self {
            Self::Analysis(a) => Some(a),
            _ => None,
        }
    }

    /// Progress shown to the user. Zero outside of processing.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.processing().map_or(0.0, |p| p.progress.value())
    }

    #[must_use]
    pub fn error(&self) -> Option<&AppError> {
        match self {
            Self::Upload { error } => error.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn batch(&self) -> Option<&Batch> {
        match self {
            Self::Upload { .. } => None,
            Self::Processing(p) => Some(&p.batch),
            Self::Analysis(a) => Some(&a.batch),
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Upload { .. } => None,
            Self::Processing(p) => p.outcome(),
            Self::Analysis(a) => Some(&a.result),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScreenEvent {
    /// A non-empty batch was submitted.
    Submit(Batch),
    /// The batch has been handed to the collaborators.
    Dispatched,
    ImageStaged { index: usize, data: InlineData },
    Tick { generation: u64, fraction: f64 },
    Succeeded(Box<AnalysisResult>),
    Failed(AppError),
    /// The settle delay after success ran out.
    Settled,
    Reset,
    SelectViewMode(ViewMode),
    ToggleSpecies(String),
    ClearSelection,
    ToggleChat,
}

#[must_use]
pub fn transition(screen: Screen, event: ScreenEvent, config: &ProgressConfig) -> Screen {
    match (screen, event) {
        (Screen::Upload { .. }, ScreenEvent::Submit(batch)) => {
            Screen::Processing(Box::new(ProcessingScreen::new(batch, config)))
        }

        (Screen::Processing(mut p), ScreenEvent::Dispatched) => {
            p.progress.submitted();
            p.record_progress();
            Screen::Processing(p)
        }

        (Screen::Processing(mut p), ScreenEvent::ImageStaged { index, data }) => {
            if let Some(slot) = p.staged.get_mut(index) {
                if slot.is_none() {
                    *slot = Some(data);
                    if p.staged.iter().all(Option::is_some) {
                        p.ready = Some(p.staged.iter_mut().filter_map(Option::take).collect());
                        p.progress.start_ticking();
                        p.record_progress();
                    }
                }
            }
            Screen::Processing(p)
        }

        (Screen::Processing(mut p), ScreenEvent::Tick { generation, fraction }) => {
            if p.progress.tick(generation, fraction).is_some() {
                p.record_progress();
            }
            Screen::Processing(p)
        }

        (Screen::Processing(mut p), ScreenEvent::Succeeded(result)) => {
            if p.outcome.is_none() {
                p.progress.complete();
                p.record_progress();
                p.outcome = Some(result);
            }
            Screen::Processing(p)
        }

        (Screen::Processing(mut p), ScreenEvent::Failed(error)) => {
            p.progress.cancel();
            Screen::Upload { error: Some(error) }
        }

        (Screen::Processing(mut p), ScreenEvent::Settled) => match p.outcome.take() {
            Some(result) => Screen::Analysis(Box::new(AnalysisScreen {
                batch: p.batch,
                result,
                view_mode: ViewMode::default(),
                selected_species: None,
                show_chat: false,
                chat: ChatSession::default(),
            })),
            None => Screen::Processing(p),
        },

        (Screen::Analysis(_), ScreenEvent::Reset) => Screen::default(),

        (Screen::Analysis(mut a), ScreenEvent::SelectViewMode(mode)) => {
            a.view_mode = mode;
            a.selected_species = None;
            Screen::Analysis(a)
        }

        (Screen::Analysis(mut a), ScreenEvent::ToggleSpecies(name)) => {
            a.selected_species = if a.selected_species.as_deref() == Some(name.as_str()) {
                None
            } else {
                Some(name)
            };
            Screen::Analysis(a)
        }

        (Screen::Analysis(mut a), ScreenEvent::ClearSelection) => {
            a.selected_species = None;
            Screen::Analysis(a)
        }

        (Screen::Analysis(mut a), ScreenEvent::ToggleChat) => {
            a.show_chat = !a.show_chat;
            Screen::Analysis(a)
        }

        (screen, _) => screen,
    }
}
