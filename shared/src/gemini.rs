//! Wire format of the generative AI `generateContent` endpoint, and the four
//! requests the review tool sends through it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::capabilities::{PcmClip, RecordedAudio};
use crate::model::{AnalysisData, AnalysisResult, ChatMessage, ChatSender, Source};

pub const API_KEY_HEADER: &str = "x-goog-api-key";

const ANALYSIS_SYSTEM_INSTRUCTION: &str = "Du bist ein erfahrener Wildbiologe und Forstwirt. \
Sei präzise, fachlich korrekt und nutze waidmännische Fachbegriffe wenn passend.";

const ANALYSIS_PROMPT: &str = "Analysiere diese Wildkamera-Bilder für einen Förster im deutschen Wald-Kontext.
Erstelle eine strukturierte Analyse.
Identifiziere Tierarten (nutze präzise deutsche Namen, z.B. Rothirsch, Wildschwein, Reh), zähle Individuen und notiere Verhaltensweisen.
Identifiziere Auffälligkeiten (Verletzungen, Räude, seltene Arten, Zäune/Infrastruktur).
Klassifiziere Bilder ohne Wildtiere (Menschen, Fahrzeuge, Leeraufnahmen).
Die Bild-Indizes entsprechen der Reihenfolge der hochgeladenen Dateien (0-basiert).
Antworte ausschließlich im definierten JSON-Format.";

const CHAT_PRIMING_USER: &str = "System initialisierung.";
const CHAT_PRIMING_MODEL: &str = "System bereit. Warte auf Eingabe.";

const TRANSCRIPTION_PROMPT: &str =
    "Transkribiere diese Audioaufnahme direkt auf Deutsch, ohne Einleitung.";

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceError {
    #[error("analysis service is not configured")]
    NotConfigured,

    #[error("request could not be built: {0}")]
    Request(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned HTTP {0}")]
    Status(u16),

    #[error("empty response body")]
    EmptyBody,

    #[error("response contained no {0}")]
    MissingPayload(String),

    #[error("payload could not be decoded: {0}")]
    Decode(String),
}

// --- Request types ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn new(role: Option<&str>, parts: Vec<Part>) -> Self {
        Self {
            role: role.map(str::to_owned),
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    #[must_use]
    pub fn inline(data: InlineData) -> Self {
        Self {
            text: None,
            inline_data: Some(data),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64, standard alphabet with padding.
    pub data: String,
}

impl InlineData {
    #[must_use]
    pub fn encode(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_owned(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, ServiceError> {
        STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

impl fmt::Debug for InlineData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineData")
            .field("mime_type", &self.mime_type)
            .field("encoded_len", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub google_search: Option<GoogleSearch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoogleSearch {}

// --- Response types ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebChunk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebChunk {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub total_token_count: u64,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map_or(&[], |c| c.parts.as_slice())
    }

    /// Concatenated text parts of the first candidate.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    #[must_use]
    pub fn inline_data(&self) -> Option<&InlineData> {
        self.first_parts().iter().find_map(|p| p.inline_data.as_ref())
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.usage_metadata.map_or(0, |u| u.total_token_count)
    }

    /// Web sources the answer was grounded on, in the order given.
    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| {
                m.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .map(|web| Source {
                        title: web.title.clone().unwrap_or_default(),
                        uri: web.uri.clone().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// --- Request builders ---

pub fn endpoint(base: &url::Url, model: &str) -> Result<url::Url, ServiceError> {
    base.join(&format!("v1beta/models/{model}:generateContent"))
        .map_err(|e| ServiceError::Request(e.to_string()))
}

fn analysis_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING", "description": "Eine prägnante Zusammenfassung der Ergebnisse auf Deutsch." },
            "totalAnimals": { "type": "NUMBER", "description": "Gesamtanzahl aller erkannten Tiere." },
            "speciesAnalysis": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "speciesName": { "type": "STRING", "description": "Deutscher Name der Tierart." },
                        "count": { "type": "NUMBER" },
                        "behavior": { "type": "STRING", "description": "Beobachtung zu Verhalten, Gesundheit oder Gruppierung auf Deutsch." },
                        "imageIndices": { "type": "ARRAY", "items": { "type": "NUMBER" }, "description": "Null-basierte Indizes der Bilder." }
                    },
                    "required": ["speciesName", "count", "behavior", "imageIndices"]
                }
            },
            "anomalies": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "description": { "type": "STRING", "description": "Beschreibung der Auffälligkeit auf Deutsch (Verletzungen, fremde Objekte, Krankheiten)." },
                        "imageIndices": { "type": "ARRAY", "items": { "type": "NUMBER" } },
                        "severity": { "type": "STRING", "enum": ["low", "medium", "high"] }
                    },
                    "required": ["description", "imageIndices", "severity"]
                }
            },
            "nonWildlifeIndices": { "type": "ARRAY", "items": { "type": "NUMBER" }, "description": "Indizes von Bildern mit Menschen, Fahrzeugen oder Leere." }
        },
        "required": ["summary", "totalAnimals", "speciesAnalysis", "anomalies", "nonWildlifeIndices"]
    })
}

/// One prompt part followed by the images in batch order.
#[must_use]
pub fn analysis_request(images: Vec<InlineData>) -> GenerateContentRequest {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(Part::text(ANALYSIS_PROMPT));
    parts.extend(images.into_iter().map(Part::inline));

    GenerateContentRequest {
        contents: vec![Content::new(None, parts)],
        system_instruction: Some(Content::new(None, vec![Part::text(ANALYSIS_SYSTEM_INSTRUCTION)])),
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".into()),
            response_schema: Some(analysis_schema()),
            ..GenerationConfig::default()
        }),
        tools: Vec::new(),
    }
}

fn chat_system_instruction(report_context: &str) -> String {
    format!(
        "Du bist ein intelligenter Assistent für ein Wildtier-Überwachungssystem für Förster.
Du hast Zugriff auf folgende Analysedaten im JSON-Format:
{report_context}

Beantworte die Fragen des Nutzers basierend auf diesen Daten.
Antworte immer auf Deutsch. Sei kurz, prägnant und hilfreich für den Arbeitseinsatz im Revier."
    )
}

/// The full conversation is resent on every turn.
#[must_use]
pub fn chat_request(
    report_context: &str,
    history: &[ChatMessage],
    message: &str,
) -> GenerateContentRequest {
    let mut contents = Vec::with_capacity(history.len() + 3);
    contents.push(Content::new(Some("user"), vec![Part::text(CHAT_PRIMING_USER)]));
    contents.push(Content::new(Some("model"), vec![Part::text(CHAT_PRIMING_MODEL)]));
    contents.extend(history.iter().map(|msg| {
        let role = match msg.sender {
            ChatSender::User => "user",
            ChatSender::Assistant => "model",
        };
        Content::new(Some(role), vec![Part::text(msg.text.clone())])
    }));
    contents.push(Content::new(Some("user"), vec![Part::text(message)]));

    GenerateContentRequest {
        contents,
        system_instruction: Some(Content::new(
            None,
            vec![Part::text(chat_system_instruction(report_context))],
        )),
        generation_config: None,
        tools: vec![Tool {
            google_search: Some(GoogleSearch {}),
        }],
    }
}

#[must_use]
pub fn transcription_request(audio: &RecordedAudio) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::new(
            None,
            vec![
                Part::text(TRANSCRIPTION_PROMPT),
                Part::inline(InlineData::encode(&audio.mime_type, &audio.bytes)),
            ],
        )],
        system_instruction: None,
        generation_config: None,
        tools: Vec::new(),
    }
}

#[must_use]
pub fn speech_request(text: &str, voice: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::new(None, vec![Part::text(text)])],
        system_instruction: None,
        generation_config: Some(GenerationConfig {
            response_modalities: Some(vec!["AUDIO".into()]),
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice.to_owned(),
                    },
                },
            }),
            ..GenerationConfig::default()
        }),
        tools: Vec::new(),
    }
}

// --- Response handling ---

/// Unwraps an HTTP completion into the decoded body.
pub fn decode_http<E: fmt::Display>(
    result: Result<crux_http::Response<GenerateContentResponse>, E>,
) -> Result<GenerateContentResponse, ServiceError> {
    let mut response = result.map_err(|e| ServiceError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Status(u16::from(status)));
    }
    response.take_body().ok_or(ServiceError::EmptyBody)
}

/// An unreadable report is not an error: the fallback report is shown
/// instead, with whatever token usage was reported.
#[must_use]
pub fn analysis_result(
    response: &GenerateContentResponse,
    cost_per_million_tokens: f64,
) -> AnalysisResult {
    let data = response
        .text()
        .filter(|text| !text.trim().is_empty())
        .and_then(|text| match serde_json::from_str::<AnalysisData>(&text) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(error = %e, "analysis report could not be parsed");
                None
            }
        })
        .unwrap_or_else(AnalysisData::fallback);

    let tokens = response.total_tokens();
    AnalysisResult {
        raw_markdown: serde_json::to_string_pretty(&data).ok(),
        estimated_cost: crate::report::estimate_cost(tokens, cost_per_million_tokens),
        tokens,
        data,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub sources: Option<Vec<Source>>,
}

pub fn chat_reply(response: &GenerateContentResponse) -> Result<ChatReply, ServiceError> {
    let text = response
        .text()
        .ok_or_else(|| ServiceError::MissingPayload("text".into()))?;
    let sources = response.sources();
    Ok(ChatReply {
        text,
        sources: (!sources.is_empty()).then_some(sources),
    })
}

/// The transcriber may legitimately hear nothing.
#[must_use]
pub fn transcript(response: &GenerateContentResponse) -> String {
    response.text().unwrap_or_default().trim().to_owned()
}

pub fn speech_audio(response: &GenerateContentResponse) -> Result<PcmClip, ServiceError> {
    let data = response
        .inline_data()
        .ok_or_else(|| ServiceError::MissingPayload("audio".into()))?;
    Ok(PcmClip {
        sample_rate: crate::SPEECH_SAMPLE_RATE,
        channels: crate::SPEECH_CHANNELS,
        samples: data.decode()?,
    })
}
