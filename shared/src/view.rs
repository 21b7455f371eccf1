use serde::{Deserialize, Serialize};

use crate::chat::{ChatSession, MicState};
use crate::filter::{visible_images, VisibleImage};
use crate::model::{AnomalyData, ChatMessage, SpeciesData, ViewMode};
use crate::screen::{AnalysisScreen, ProcessingScreen, Screen};
use crate::AppError;

pub const SETTINGS_FOOTER: &str = "WILDTIER OS v2.5.1 // BUILD 9942";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    Upload {
        error: Option<UserFacingError>,
        is_configured: bool,
    },
    Processing {
        title: String,
        batch_size: usize,
        progress: f64,
        log: Vec<String>,
    },
    Analysis(Box<AnalysisView>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalysisView {
    pub view_mode: ViewMode,
    pub title: String,
    pub subtitle: String,
    pub tokens: u64,
    pub estimated_cost: String,
    pub alert_count: usize,
    pub content: ModeContent,
    /// `None` in settings mode.
    pub image_log: Option<ImageLogView>,
    pub chat: ChatView,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeContent {
    Dashboard {
        stats: StatsView,
        summary: String,
        species: Vec<SpeciesCard>,
    },
    Alerts {
        anomalies: Vec<AnomalyCard>,
    },
    Settings {
        rows: Vec<SettingRow>,
        footer: String,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsView {
    pub total_animals: u32,
    pub species_count: usize,
    pub anomaly_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeciesCard {
    pub species_name: String,
    pub count: u32,
    pub behavior: String,
    pub image_count: usize,
    pub is_selected: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnomalyCard {
    pub description: String,
    pub severity_label: String,
    pub is_high: bool,
    pub affected_images: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingControl {
    Text(String),
    Toggle(bool),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingRow {
    pub label: String,
    pub description: String,
    pub control: SettingControl,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageLogView {
    pub filter_label: String,
    pub images: Vec<VisibleImage>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatView {
    pub visible: bool,
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub mic: MicState,
    pub speaking_message_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub state: ViewState,
}

impl ViewModel {
    #[must_use]
    pub fn build(screen: &Screen, is_configured: bool) -> Self {
        let state = match screen {
            Screen::Upload { error } => ViewState::Upload {
                error: error.as_ref().map(UserFacingError::from),
                is_configured,
            },
            Screen::Processing(p) => processing_state(p),
            Screen::Analysis(a) => ViewState::Analysis(Box::new(analysis_view(a))),
        };
        Self { state }
    }
}

fn processing_state(p: &ProcessingScreen) -> ViewState {
    ViewState::Processing {
        title: format!("VERARBEITUNG::BATCH_{}", p.batch.len()),
        batch_size: p.batch.len(),
        progress: p.progress.value(),
        log: p.log.lines().iter().map(|line| (*line).to_owned()).collect(),
    }
}

#[must_use]
pub const fn title_for(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::Dashboard => "ÜBERSICHT",
        ViewMode::Alerts => "WARNUNGEN & AUFFÄLLIGKEITEN",
        ViewMode::Settings => "SYSTEM EINSTELLUNGEN",
    }
}

fn analysis_view(a: &AnalysisScreen) -> AnalysisView {
    let data = &a.result.data;
    let selected = a.selected_species.as_deref();

    let content = match a.view_mode {
        ViewMode::Dashboard => ModeContent::Dashboard {
            stats: StatsView {
                total_animals: data.total_animals,
                species_count: data.species_analysis.len(),
                anomaly_count: data.anomalies.len(),
            },
            summary: data.summary.clone(),
            species: data
                .species_analysis
                .iter()
                .map(|s| species_card(s, selected))
                .collect(),
        },
        ViewMode::Alerts => ModeContent::Alerts {
            anomalies: data.anomalies.iter().map(anomaly_card).collect(),
        },
        ViewMode::Settings => ModeContent::Settings {
            rows: settings_rows(),
            footer: SETTINGS_FOOTER.into(),
        },
    };

    let image_log = match a.view_mode {
        ViewMode::Dashboard | ViewMode::Alerts => Some(ImageLogView {
            filter_label: match (selected, a.view_mode) {
                (Some(name), _) => name.to_uppercase(),
                (None, ViewMode::Alerts) => "AUFFÄLLIGKEITEN".into(),
                (None, _) => "ALLE".into(),
            },
            images: visible_images(a.view_mode, selected, data, &a.batch),
        }),
        ViewMode::Settings => None,
    };

    AnalysisView {
        view_mode: a.view_mode,
        title: title_for(a.view_mode).into(),
        subtitle: selected.unwrap_or(crate::DEFAULT_AREA_LABEL).to_owned(),
        tokens: a.result.tokens,
        estimated_cost: a.result.estimated_cost.clone(),
        alert_count: data.anomalies.len(),
        content,
        image_log,
        chat: chat_view(&a.chat, a.show_chat),
    }
}

fn species_card(s: &SpeciesData, selected: Option<&str>) -> SpeciesCard {
    SpeciesCard {
        species_name: s.species_name.clone(),
        count: s.count,
        behavior: s.behavior.clone(),
        image_count: s.image_indices.len(),
        is_selected: selected == Some(s.species_name.as_str()),
    }
}

fn anomaly_card(anomaly: &AnomalyData) -> AnomalyCard {
    AnomalyCard {
        description: anomaly.description.clone(),
        severity_label: anomaly.severity.label().into(),
        is_high: anomaly.severity == crate::model::Severity::High,
        affected_images: anomaly.image_indices.len(),
    }
}

fn settings_rows() -> Vec<SettingRow> {
    let row = |label: &str, description: &str, control| SettingRow {
        label: label.into(),
        description: description.into(),
        control,
    };
    vec![
        row(
            "Sprache",
            "Standardsprache für Berichte und UI",
            SettingControl::Text("DEUTSCH (FORST)".into()),
        ),
        row(
            "Datenaufbewahrung",
            "Automatisches Löschen lokaler Daten nach Sitzung",
            SettingControl::Toggle(true),
        ),
        row(
            "Hochauflösende Analyse",
            "Verwendet Gemini Pro für maximale Detailgenauigkeit",
            SettingControl::Toggle(true),
        ),
        row(
            "Benachrichtigungen",
            "Audio-Signal bei Abschluss der Analyse",
            SettingControl::Toggle(false),
        ),
        row(
            "Export Format",
            "Standardformat für Berichte",
            SettingControl::Text("JSON / PDF".into()),
        ),
    ]
}

fn chat_view(chat: &ChatSession, visible: bool) -> ChatView {
    ChatView {
        visible,
        messages: chat.messages().to_vec(),
        is_loading: chat.is_busy(),
        mic: chat.mic(),
        speaking_message_id: chat.speaking().map(|h| h.message_id.to_string()),
    }
}
