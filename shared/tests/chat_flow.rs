mod common;

use assert_matches::assert_matches;

use trailcam_shared::capabilities::{
    AudioError, AudioOperation, AudioOutput, PcmClip, RecordedAudio,
};
use trailcam_shared::chat::{MicState, CHAT_FAILURE_TEXT};
use trailcam_shared::event::ChatRequestId;
use trailcam_shared::gemini::{ChatReply, ServiceError};
use trailcam_shared::model::{ChatSender, Source};
use trailcam_shared::view::ViewState;
use trailcam_shared::{Effect, Event, Model};

use common::*;

fn in_flight(model: &Model) -> Option<ChatRequestId> {
    model
        .screen
        .analysis()
        .and_then(|a| a.chat.in_flight().cloned())
}

fn message_count(model: &Model) -> usize {
    model
        .screen
        .analysis()
        .map_or(0, |a| a.chat.messages().len())
}

/// Sends `question` and answers it with `answer`.
fn ask(app: &Tester, model: &mut Model, question: &str, answer: &str) {
    app.update(
        Event::ChatSubmitted {
            text: question.into(),
        },
        model,
    );
    let request_id = in_flight(model).expect("request in flight");
    app.update(
        Event::ChatReplied {
            request_id,
            result: Ok(ChatReply {
                text: answer.into(),
                sources: None,
            }),
        },
        model,
    );
}

fn clip() -> PcmClip {
    PcmClip {
        sample_rate: 24_000,
        channels: 1,
        samples: vec![0; 480],
    }
}

#[test]
fn chat_round_trip_with_sources() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    app.update(Event::ChatToggled, &mut model);
    let update = app.update(
        Event::ChatSubmitted {
            text: "Wie viele Rehe?".into(),
        },
        &mut model,
    );
    let urls = http_urls(&update.effects);
    assert_eq!(urls.len(), 1);
    assert!(urls[0].ends_with("models/gemini-2.5-flash:generateContent"));
    assert_eq!(message_count(&model), 1);

    let ViewState::Analysis(view) = app.view(&model).state else {
        panic!("expected analysis view");
    };
    assert!(view.chat.visible);
    assert!(view.chat.is_loading);

    // A second send while the first is outstanding goes nowhere.
    let update = app.update(
        Event::ChatSubmitted {
            text: "Und Füchse?".into(),
        },
        &mut model,
    );
    assert!(http_urls(&update.effects).is_empty());
    assert_eq!(message_count(&model), 1);

    let request_id = in_flight(&model).expect("request in flight");
    app.update(
        Event::ChatReplied {
            request_id,
            result: Ok(ChatReply {
                text: "Zwei Rehe auf Bild 1 und 2.".into(),
                sources: Some(vec![Source {
                    title: "Rehwild".into(),
                    uri: "https://example.org/reh".into(),
                }]),
            }),
        },
        &mut model,
    );
    let chat = &model.screen.analysis().unwrap().chat;
    assert!(!chat.is_in_flight());
    let reply = &chat.messages()[1];
    assert_eq!(reply.sender, ChatSender::Assistant);
    assert_eq!(reply.sources.as_ref().map(Vec::len), Some(1));
}

#[test]
fn blank_messages_are_ignored() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    for text in ["", "   "] {
        let update = app.update(Event::ChatSubmitted { text: text.into() }, &mut model);
        assert!(http_urls(&update.effects).is_empty());
    }
    assert_eq!(message_count(&model), 0);
}

#[test]
fn chat_failure_becomes_a_message() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    app.update(
        Event::ChatSubmitted {
            text: "Hallo".into(),
        },
        &mut model,
    );
    let request_id = in_flight(&model).unwrap();
    app.update(
        Event::ChatReplied {
            request_id,
            result: Err(ServiceError::Status(429)),
        },
        &mut model,
    );

    let chat = &model.screen.analysis().unwrap().chat;
    assert_eq!(chat.messages().len(), 2);
    assert_eq!(chat.messages()[1].text, CHAT_FAILURE_TEXT);
    assert!(!chat.is_in_flight());
}

#[test]
fn stale_reply_is_dropped() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    app.update(
        Event::ChatSubmitted {
            text: "Hallo".into(),
        },
        &mut model,
    );
    app.update(
        Event::ChatReplied {
            request_id: ChatRequestId::new("someone-else"),
            result: Err(ServiceError::EmptyBody),
        },
        &mut model,
    );
    assert_eq!(message_count(&model), 1);
    assert!(in_flight(&model).is_some());
}

#[test]
fn speak_toggles_and_supersedes() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    ask(&app, &mut model, "Frage", "Antwort");
    ask(&app, &mut model, "Noch eine", "Zweite Antwort");
    let (answer, later) = {
        let messages = model.screen.analysis().unwrap().chat.messages();
        (messages[1].id.clone(), messages[3].id.clone())
    };

    // First speak: synthesis request, then playback.
    let update = app.update(
        Event::SpeakRequested {
            message_id: answer.clone(),
        },
        &mut model,
    );
    let urls = http_urls(&update.effects);
    assert!(urls[0].ends_with("models/gemini-2.5-flash-preview-tts:generateContent"));
    let token = model
        .screen
        .analysis()
        .and_then(|a| a.chat.speaking())
        .map(|h| h.token.clone())
        .unwrap();
    let update = app.update(
        Event::SpeechSynthesized {
            token: token.clone(),
            result: Ok(clip()),
        },
        &mut model,
    );
    let plays = audio_requests(update.effects);
    assert_matches!(&plays[..], [p] if matches!(&p.operation, AudioOperation::Play { token: t, .. } if *t == token));

    // Speaking another message stops the first.
    let update = app.update(
        Event::SpeakRequested {
            message_id: later.clone(),
        },
        &mut model,
    );
    let audio = audio_requests(update.effects);
    assert!(audio
        .iter()
        .any(|r| matches!(&r.operation, AudioOperation::Stop { token: t } if *t == token)));
    let speaking = model.screen.analysis().unwrap().chat.speaking().unwrap();
    assert_eq!(speaking.message_id, later);
    let second = speaking.token.clone();
    app.update(
        Event::SpeechSynthesized {
            token: second.clone(),
            result: Ok(clip()),
        },
        &mut model,
    );

    // The first playback ending late leaves the second in place.
    app.update(Event::PlaybackEnded { token }, &mut model);
    assert!(model.screen.analysis().unwrap().chat.speaking().is_some());

    // Speaking the same message again stops it.
    let update = app.update(
        Event::SpeakRequested {
            message_id: later,
        },
        &mut model,
    );
    let audio = audio_requests(update.effects);
    assert!(audio
        .iter()
        .any(|r| matches!(&r.operation, AudioOperation::Stop { token: t } if *t == second)));
    assert!(model.screen.analysis().unwrap().chat.speaking().is_none());
}

#[test]
fn synthesis_failure_is_silent() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    ask(&app, &mut model, "Frage", "Antwort");
    let id = model.screen.analysis().unwrap().chat.messages()[1].id.clone();
    app.update(Event::SpeakRequested { message_id: id }, &mut model);
    let token = model
        .screen
        .analysis()
        .and_then(|a| a.chat.speaking())
        .map(|h| h.token.clone())
        .unwrap();

    let update = app.update(
        Event::SpeechSynthesized {
            token,
            result: Err(ServiceError::MissingPayload("audio".into())),
        },
        &mut model,
    );
    assert!(audio_requests(update.effects).is_empty());
    let chat = &model.screen.analysis().unwrap().chat;
    assert!(chat.speaking().is_none());
    assert_eq!(chat.messages().len(), 2);
}

#[test]
fn user_messages_are_not_spoken() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    ask(&app, &mut model, "Frage", "Antwort");
    let question = model.screen.analysis().unwrap().chat.messages()[0].id.clone();
    let update = app.update(
        Event::SpeakRequested {
            message_id: question,
        },
        &mut model,
    );
    assert!(http_urls(&update.effects).is_empty());
    assert!(model.screen.analysis().unwrap().chat.speaking().is_none());
}

#[test]
fn chat_request_carries_the_report() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    let update = app.update(
        Event::ChatSubmitted {
            text: "Was ist mit dem Fuchs?".into(),
        },
        &mut model,
    );
    let body = update
        .effects
        .iter()
        .find_map(|e| match e {
            Effect::Http(request) => {
                Some(String::from_utf8_lossy(&request.operation.body).into_owned())
            }
            _ => None,
        })
        .expect("chat request");
    assert!(body.contains("Rotfuchs"));
    assert!(body.contains("Verletzung am Hinterlauf"));
}

#[test]
fn voice_input_is_transcribed_and_sent() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    let update = app.update(Event::MicToggled, &mut model);
    let mut start = audio_requests(update.effects);
    assert_matches!(start[0].operation, AudioOperation::StartRecording);
    let started = app
        .resolve(&mut start[0], Ok(AudioOutput::RecordingStarted))
        .unwrap();
    for event in started.events {
        app.update(event, &mut model);
    }
    assert_eq!(model.screen.analysis().unwrap().chat.mic(), MicState::Listening);

    let update = app.update(Event::MicToggled, &mut model);
    let mut stop = audio_requests(update.effects);
    assert_matches!(stop[0].operation, AudioOperation::StopRecording);
    let recorded = app
        .resolve(
            &mut stop[0],
            Ok(AudioOutput::Recorded(RecordedAudio {
                mime_type: "audio/webm".into(),
                bytes: vec![1, 2, 3],
            })),
        )
        .unwrap();
    let mut urls = Vec::new();
    for event in recorded.events {
        urls = http_urls(&app.update(event, &mut model).effects);
    }
    assert_eq!(urls.len(), 1);
    let ViewState::Analysis(view) = app.view(&model).state else {
        panic!("expected analysis view");
    };
    assert!(view.chat.is_loading);

    let batch_id = batch_id(&model);
    let update = app.update(
        Event::TranscriptionCompleted {
            batch_id,
            result: Ok("Wo ist der Fuchs?".into()),
        },
        &mut model,
    );
    assert_eq!(http_urls(&update.effects).len(), 1);
    let chat = &model.screen.analysis().unwrap().chat;
    assert_eq!(chat.messages()[0].text, "Wo ist der Fuchs?");
    assert!(chat.is_in_flight());
}

#[test]
fn typed_message_waits_for_pending_transcription() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    let update = app.update(Event::MicToggled, &mut model);
    let mut start = audio_requests(update.effects);
    for event in app
        .resolve(&mut start[0], Ok(AudioOutput::RecordingStarted))
        .unwrap()
        .events
    {
        app.update(event, &mut model);
    }
    let update = app.update(Event::MicToggled, &mut model);
    let mut stop = audio_requests(update.effects);
    let recorded = app
        .resolve(
            &mut stop[0],
            Ok(AudioOutput::Recorded(RecordedAudio {
                mime_type: "audio/webm".into(),
                bytes: vec![1, 2, 3],
            })),
        )
        .unwrap();
    for event in recorded.events {
        app.update(event, &mut model);
    }

    // Transcription outstanding: typing goes nowhere.
    let update = app.update(
        Event::ChatSubmitted {
            text: "Getippt".into(),
        },
        &mut model,
    );
    assert!(http_urls(&update.effects).is_empty());
    assert_eq!(message_count(&model), 0);

    // The spoken words still get through.
    let batch_id = batch_id(&model);
    app.update(
        Event::TranscriptionCompleted {
            batch_id,
            result: Ok("Gesprochen".into()),
        },
        &mut model,
    );
    let chat = &model.screen.analysis().unwrap().chat;
    assert_eq!(chat.messages()[0].text, "Gesprochen");
    assert!(chat.is_in_flight());
}

#[test]
fn empty_transcription_sends_nothing() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    let batch_id = batch_id(&model);
    let update = app.update(
        Event::TranscriptionCompleted {
            batch_id,
            result: Ok(String::new()),
        },
        &mut model,
    );
    assert!(http_urls(&update.effects).is_empty());
    assert_eq!(message_count(&model), 0);
}

#[test]
fn denied_microphone_changes_nothing() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    let update = app.update(Event::MicToggled, &mut model);
    let mut start = audio_requests(update.effects);
    let denied = app
        .resolve(&mut start[0], Err(AudioError::PermissionDenied))
        .unwrap();
    for event in denied.events {
        app.update(event, &mut model);
    }
    let chat = &model.screen.analysis().unwrap().chat;
    assert_eq!(chat.mic(), MicState::Idle);
    assert!(chat.messages().is_empty());
}

#[test]
fn leaving_analysis_releases_audio() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    // Start recording.
    let update = app.update(Event::MicToggled, &mut model);
    let mut start = audio_requests(update.effects);
    let started = app
        .resolve(&mut start[0], Ok(AudioOutput::RecordingStarted))
        .unwrap();
    for event in started.events {
        app.update(event, &mut model);
    }

    let update = app.update(Event::NewAnalysisRequested, &mut model);
    let audio = audio_requests(update.effects);
    assert!(audio
        .iter()
        .any(|r| matches!(r.operation, AudioOperation::StopRecording)));
    assert_eq!(model.screen.name(), "upload");
}

#[test]
fn microphone_granted_after_leaving_analysis_is_stopped() {
    let (app, mut model) = setup();
    analysed(&app, &mut model);

    let update = app.update(Event::MicToggled, &mut model);
    let mut start = audio_requests(update.effects);
    app.update(Event::NewAnalysisRequested, &mut model);

    // Permission arrives after the session is gone.
    let granted = app
        .resolve(&mut start[0], Ok(AudioOutput::RecordingStarted))
        .unwrap();
    let mut stops = Vec::new();
    for event in granted.events {
        let update = app.update(event, &mut model);
        stops.extend(
            audio_requests(update.effects)
                .into_iter()
                .filter(|r| matches!(r.operation, AudioOperation::StopRecording)),
        );
    }
    assert_eq!(stops.len(), 1);

    // The orphaned clip is discarded.
    let finished = app
        .resolve(
            &mut stops[0],
            Ok(AudioOutput::Recorded(RecordedAudio {
                mime_type: "audio/webm".into(),
                bytes: vec![9],
            })),
        )
        .unwrap();
    for event in finished.events {
        let update = app.update(event, &mut model);
        assert!(http_urls(&update.effects).is_empty());
    }
    assert_eq!(model.screen.name(), "upload");
}
