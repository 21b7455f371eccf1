use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::ServiceSettings;
use crate::progress::{IncrementSource, ProgressConfig, RandomIncrements};
use crate::screen::Screen;

crate::event::typed_id!(BatchId);
crate::event::typed_id!(MessageId);

/// Opaque reference to one uploaded image. The bytes stay with the shell
/// until the core asks for them through the `Files` capability.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub preview_url: Option<String>,
}

/// The ordered images of one analysis cycle. Position in `images` is the
/// join key for every index the report refers to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub id: BatchId,
    images: Vec<ImageHandle>,
}

impl Batch {
    /// Returns `None` for an empty upload.
    #[must_use]
    pub fn new(images: Vec<ImageHandle>) -> Option<Self> {
        if images.is_empty() {
            return None;
        }
        Some(Self {
            id: BatchId::generate(),
            images,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[must_use]
    pub fn images(&self) -> &[ImageHandle] {
        &self.images
    }

    /// Out-of-range and negative indices resolve to nothing.
    #[must_use]
    pub fn get(&self, index: i64) -> Option<&ImageHandle> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.images.get(i))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "NIEDRIG",
            Self::Medium => "MITTEL",
            Self::High => "HOCH",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesData {
    pub species_name: String,
    #[serde(deserialize_with = "lenient::count")]
    pub count: u32,
    #[serde(default)]
    pub behavior: String,
    #[serde(default, deserialize_with = "lenient::indices")]
    pub image_indices: Vec<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyData {
    pub description: String,
    #[serde(default, deserialize_with = "lenient::indices")]
    pub image_indices: Vec<i64>,
    pub severity: Severity,
}

/// One completed report, exactly as the analysis service returned it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisData {
    pub summary: String,
    #[serde(deserialize_with = "lenient::count")]
    pub total_animals: u32,
    #[serde(default)]
    pub species_analysis: Vec<SpeciesData>,
    #[serde(default)]
    pub anomalies: Vec<AnomalyData>,
    #[serde(default, deserialize_with = "lenient::indices")]
    pub non_wildlife_indices: Vec<i64>,
}

impl AnalysisData {
    /// Report shown when the service answered but its body could not be read.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            summary: "Fehler bei der Datenverarbeitung.".into(),
            total_animals: 0,
            species_analysis: Vec::new(),
            anomalies: Vec::new(),
            non_wildlife_indices: Vec::new(),
        }
    }

    #[must_use]
    pub fn species(&self, name: &str) -> Option<&SpeciesData> {
        self.species_analysis.iter().find(|s| s.species_name == name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub data: AnalysisData,
    pub raw_markdown: Option<String>,
    pub tokens: u64,
    pub estimated_cost: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Dashboard,
    Alerts,
    Settings,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatSender {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: ChatSender,
    pub text: String,
    pub sources: Option<Vec<Source>>,
}

impl ChatMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            sender: ChatSender::User,
            text: text.into(),
            sources: None,
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>, sources: Option<Vec<Source>>) -> Self {
        Self {
            id: MessageId::generate(),
            sender: ChatSender::Assistant,
            text: text.into(),
            sources,
        }
    }
}

/// Resolved service configuration. The key only leaves this struct as a
/// request header.
pub struct ServiceConfig {
    pub api_key: SecretString,
    pub base_url: url::Url,
    pub analysis_model: String,
    pub chat_model: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub voice: String,
    pub cost_per_million_tokens: f64,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url.as_str())
            .field("analysis_model", &self.analysis_model)
            .field("chat_model", &self.chat_model)
            .field("transcription_model", &self.transcription_model)
            .field("speech_model", &self.speech_model)
            .field("voice", &self.voice)
            .field("cost_per_million_tokens", &self.cost_per_million_tokens)
            .finish()
    }
}

impl TryFrom<ServiceSettings> for ServiceConfig {
    type Error = url::ParseError;

    fn try_from(settings: ServiceSettings) -> Result<Self, Self::Error> {
        let mut base = settings
            .base_url
            .unwrap_or_else(|| crate::DEFAULT_API_BASE_URL.to_string());
        // `Url::join` replaces the last segment unless the base ends in '/'.
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            api_key: SecretString::new(settings.api_key.into_inner()),
            base_url: url::Url::parse(&base)?,
            analysis_model: settings
                .analysis_model
                .unwrap_or_else(|| crate::DEFAULT_ANALYSIS_MODEL.into()),
            chat_model: settings
                .chat_model
                .unwrap_or_else(|| crate::DEFAULT_CHAT_MODEL.into()),
            transcription_model: settings
                .transcription_model
                .unwrap_or_else(|| crate::DEFAULT_TRANSCRIPTION_MODEL.into()),
            speech_model: settings
                .speech_model
                .unwrap_or_else(|| crate::DEFAULT_SPEECH_MODEL.into()),
            voice: settings.voice.unwrap_or_else(|| crate::DEFAULT_VOICE.into()),
            cost_per_million_tokens: settings
                .cost_per_million_tokens
                .filter(|rate| rate.is_finite() && *rate >= 0.0)
                .unwrap_or(crate::DEFAULT_COST_PER_MILLION_TOKENS),
        })
    }
}

/// Application state. Everything below `screen` is configuration that
/// survives across analysis cycles.
pub struct Model {
    pub screen: Screen,
    pub service: Option<ServiceConfig>,
    pub progress_config: ProgressConfig,
    pub settle_delay_ms: u64,
    pub increments: Box<dyn IncrementSource + Send + Sync>,
}

impl Model {
    #[must_use]
    pub fn with_increments(increments: Box<dyn IncrementSource + Send + Sync>) -> Self {
        Self {
            increments,
            ..Self::default()
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self {
            screen: Screen::default(),
            service: None,
            progress_config: ProgressConfig::default(),
            settle_delay_ms: u64::try_from(crate::SETTLE_DELAY.as_millis()).unwrap_or(800),
            increments: Box::new(RandomIncrements::from_entropy()),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("screen", &self.screen)
            .field("service", &self.service)
            .field("progress_config", &self.progress_config)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .finish_non_exhaustive()
    }
}

/// The analysis service types numbers loosely; accept integral floats and
/// drop anything that is not a whole number.
mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn integral(value: &Value) -> Option<i64> {
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .filter(|f| (i64::MIN as f64..=i64::MAX as f64).contains(f))
                .map(|f| f as i64)
        })
    }

    pub fn indices<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<Value>::deserialize(deserializer)?;
        Ok(values.iter().filter_map(integral).collect())
    }

    pub fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        integral(&value)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("expected a non-negative count, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(i: usize) -> ImageHandle {
        ImageHandle {
            id: format!("img-{i}"),
            name: format!("IMG_{i:04}.JPG"),
            mime_type: "image/jpeg".into(),
            size_bytes: 1024,
            preview_url: None,
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(Batch::new(Vec::new()).is_none());
    }

    #[test]
    fn batch_lookup_tolerates_bad_indices() {
        let batch = Batch::new((0..3).map(handle).collect()).unwrap();
        assert_eq!(batch.get(2).map(|h| h.id.as_str()), Some("img-2"));
        assert!(batch.get(3).is_none());
        assert!(batch.get(-1).is_none());
    }

    #[test]
    fn report_decodes_from_service_json() {
        let json = r#"{
            "summary": "Zwei Rehe am Waldrand.",
            "totalAnimals": 2.0,
            "speciesAnalysis": [
                {"speciesName": "Reh", "count": 2, "behavior": "äsend", "imageIndices": [0, 1.0, 2.5]}
            ],
            "anomalies": [
                {"description": "Zaun beschädigt", "imageIndices": [1], "severity": "medium"}
            ],
            "nonWildlifeIndices": [3]
        }"#;
        let data: AnalysisData = serde_json::from_str(json).unwrap();
        assert_eq!(data.total_animals, 2);
        assert_eq!(data.species_analysis[0].image_indices, vec![0, 1]);
        assert_eq!(data.anomalies[0].severity, Severity::Medium);
        assert_eq!(data.non_wildlife_indices, vec![3]);
    }

    #[test]
    fn negative_count_is_rejected() {
        let json = r#"{"summary": "", "totalAnimals": -1}"#;
        assert!(serde_json::from_str::<AnalysisData>(json).is_err());
    }

    #[test]
    fn service_config_applies_defaults_and_redacts_key() {
        let config = ServiceConfig::try_from(ServiceSettings::with_api_key("k-123")).unwrap();
        assert_eq!(config.analysis_model, crate::DEFAULT_ANALYSIS_MODEL);
        assert_eq!(config.base_url.as_str(), crate::DEFAULT_API_BASE_URL);
        assert!(!format!("{config:?}").contains("k-123"));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let mut settings = ServiceSettings::with_api_key("k");
        settings.base_url = Some("http://localhost:8080/proxy".into());
        let config = ServiceConfig::try_from(settings).unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:8080/proxy/");
    }
}
