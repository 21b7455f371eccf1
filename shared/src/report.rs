use crate::capabilities::ExportFile;
use crate::model::AnalysisResult;

pub const EXPORT_FILENAME: &str = "wildtier-bericht-v2.json";
pub const EXPORT_MIME_TYPE: &str = "text/plain";

pub const PROCESSING_LOG: [&str; 11] = [
    "Initialisiere neuronales Netzwerk...",
    "Lade Modelle für Wald-Vegetation...",
    "Importiere Bilddaten...",
    "Normalisiere Belichtungswerte...",
    "Detektiere Bewegungen in ROI...",
    "Klassifiziere Tierarten...",
    "Prüfe Taxonomie-Datenbank...",
    "Analysiere Verhaltensmuster...",
    "Markiere Auffälligkeiten...",
    "Erstelle JSON Abschlussbericht...",
    "Finalisiere Datenpaket...",
];

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_cost(tokens: u64, cost_per_million_tokens: f64) -> String {
    format!("${:.2}", tokens as f64 / 1_000_000.0 * cost_per_million_tokens)
}

/// The status line shown at `progress` percent.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn log_line_for(progress: f64) -> &'static str {
    let last = PROCESSING_LOG.len() - 1;
    let step = (progress.clamp(0.0, 100.0) / 100.0 * PROCESSING_LOG.len() as f64).floor() as usize;
    PROCESSING_LOG[step.min(last)]
}

/// Append-only processing log. Lines appear in the order progress first
/// reaches them; a line the progress skipped over never shows up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessingLog {
    lines: Vec<&'static str>,
}

impl ProcessingLog {
    pub fn record(&mut self, progress: f64) {
        if progress <= 0.0 {
            self.lines.clear();
        }
        let line = log_line_for(progress);
        if !self.lines.contains(&line) {
            self.lines.push(line);
        }
    }

    #[must_use]
    pub fn lines(&self) -> &[&'static str] {
        &self.lines
    }
}

#[must_use]
pub fn export_file(result: &AnalysisResult) -> ExportFile {
    let contents = result.raw_markdown.clone().unwrap_or_else(|| {
        serde_json::to_string_pretty(&result.data).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "report could not be serialized for export");
            String::new()
        })
    });
    ExportFile {
        filename: EXPORT_FILENAME.into(),
        mime_type: EXPORT_MIME_TYPE.into(),
        contents,
    }
}
