#![allow(dead_code)]

use crux_core::testing::AppTester;
use crux_core::Request;

use trailcam_shared::capabilities::{
    AudioOperation, FileContents, FilesOperation, TimerOperation,
};
use trailcam_shared::event::ServiceSettings;
use trailcam_shared::model::{
    AnalysisData, AnalysisResult, AnomalyData, BatchId, ImageHandle, Severity, SpeciesData,
};
use trailcam_shared::progress::FixedIncrements;
use trailcam_shared::{App, Effect, Event, Model};

pub const API_KEY: &str = "test-key";

pub type Tester = AppTester<App, Effect>;

pub fn setup() -> (Tester, Model) {
    let app = Tester::default();
    let mut model = Model::with_increments(Box::new(FixedIncrements(1.0)));
    app.update(
        Event::Configure(Box::new(ServiceSettings::with_api_key(API_KEY))),
        &mut model,
    );
    (app, model)
}

pub fn handles(n: usize) -> Vec<ImageHandle> {
    (0..n)
        .map(|i| ImageHandle {
            id: format!("file-{i}"),
            name: format!("IMG_{i:04}.JPG"),
            mime_type: "image/jpeg".into(),
            size_bytes: 4,
            preview_url: Some(format!("blob:preview-{i}")),
        })
        .collect()
}

pub fn jpeg() -> FileContents {
    FileContents {
        mime_type: "image/jpeg".into(),
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
    }
}

pub fn report() -> AnalysisResult {
    AnalysisResult {
        data: AnalysisData {
            summary: "Zwei Rehe und ein verletzter Fuchs.".into(),
            total_animals: 3,
            species_analysis: vec![
                SpeciesData {
                    species_name: "Reh".into(),
                    count: 2,
                    behavior: "äsend".into(),
                    image_indices: vec![0, 1],
                },
                SpeciesData {
                    species_name: "Rotfuchs".into(),
                    count: 1,
                    behavior: "hinkend".into(),
                    image_indices: vec![2],
                },
            ],
            anomalies: vec![
                AnomalyData {
                    description: "Verletzung am Hinterlauf".into(),
                    image_indices: vec![1, 2],
                    severity: Severity::High,
                },
                AnomalyData {
                    description: "Zaun beschädigt".into(),
                    image_indices: vec![2, 3],
                    severity: Severity::Medium,
                },
            ],
            non_wildlife_indices: vec![],
        },
        raw_markdown: None,
        tokens: 1_500_000,
        estimated_cost: "$3.00".into(),
    }
}

pub fn files_requests(effects: Vec<Effect>) -> Vec<Request<FilesOperation>> {
    effects
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Files(request) => Some(request),
            _ => None,
        })
        .collect()
}

pub fn timer_requests(effects: &mut Vec<Effect>) -> Vec<Request<TimerOperation>> {
    let mut timers = Vec::new();
    let mut rest = Vec::new();
    for effect in effects.drain(..) {
        match effect {
            Effect::Timer(request) => timers.push(request),
            other => rest.push(other),
        }
    }
    *effects = rest;
    timers
}

pub fn audio_requests(effects: Vec<Effect>) -> Vec<Request<AudioOperation>> {
    effects
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Audio(request) => Some(request),
            _ => None,
        })
        .collect()
}

pub fn http_urls(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Http(request) => Some(request.operation.url.clone()),
            _ => None,
        })
        .collect()
}

pub fn batch_id(model: &Model) -> BatchId {
    model
        .screen
        .batch()
        .map(|b| b.id.clone())
        .expect("a batch is live")
}

/// Submits `n` images and answers every file read. Returns the effects of
/// the last read, which carry the analysis request and the first tick.
pub fn submit_and_stage(app: &Tester, model: &mut Model, n: usize) -> Vec<Effect> {
    let update = app.update(Event::FilesSelected(handles(n)), model);
    let mut last = Vec::new();
    for mut request in files_requests(update.effects) {
        let resolved = app.resolve(&mut request, Ok(jpeg())).expect("read resolves");
        for event in resolved.events {
            last = app.update(event, model).effects;
        }
    }
    last
}

/// Drives a fresh model all the way to the analysis screen.
pub fn analysed(app: &Tester, model: &mut Model) {
    submit_and_stage(app, model, 4);
    let batch_id = batch_id(model);
    app.update(
        Event::AnalysisCompleted {
            batch_id: batch_id.clone(),
            result: Ok(Box::new(report())),
        },
        model,
    );
    app.update(Event::SettleElapsed { batch_id }, model);
    assert!(model.screen.analysis().is_some());
}
