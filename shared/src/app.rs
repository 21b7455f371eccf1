use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::capabilities::{Capabilities, RecordedAudio};
use crate::chat::{MicAction, PlaybackHandle, PlaybackState, SpeakAction};
use crate::event::{Event, PlaybackToken};
use crate::gemini::{
    self, GenerateContentRequest, GenerateContentResponse, InlineData, ServiceError,
};
use crate::model::{Batch, BatchId, Model, ServiceConfig};
use crate::report;
use crate::screen::{transition, Screen, ScreenEvent};
use crate::view::ViewModel;
use crate::{AppError, ErrorKind};

#[derive(Default)]
pub struct App;

fn progress_timer_id(batch_id: &BatchId) -> String {
    format!("progress:{batch_id}")
}

fn settle_timer_id(batch_id: &BatchId) -> String {
    format!("settle:{batch_id}")
}

impl App {
    fn apply(model: &mut Model, event: ScreenEvent) {
        let screen = std::mem::take(&mut model.screen);
        let before = screen.name();
        model.screen = transition(screen, event, &model.progress_config);
        if before != model.screen.name() {
            info!(from = before, to = model.screen.name(), "screen changed");
        }
    }

    fn is_processing(model: &Model, batch_id: &BatchId) -> bool {
        model
            .screen
            .processing()
            .is_some_and(|p| &p.batch.id == batch_id)
    }

    fn is_analysis(model: &Model, batch_id: &BatchId) -> bool {
        model
            .screen
            .analysis()
            .is_some_and(|a| &a.batch.id == batch_id)
    }

    /// POSTs one `generateContent` request. `callback` receives the decoded
    /// body or the reason there is none.
    fn post<F>(
        service: &ServiceConfig,
        caps: &Capabilities,
        model_name: &str,
        body: &GenerateContentRequest,
        callback: F,
    ) -> Result<(), ServiceError>
    where
        F: FnOnce(Result<GenerateContentResponse, ServiceError>) -> Event + Send + 'static,
    {
        let url = gemini::endpoint(&service.base_url, model_name)?;
        caps.http
            .post(url)
            .header(gemini::API_KEY_HEADER, service.api_key.expose_secret().as_str())
            .body_json(body)
            .map_err(|e| ServiceError::Request(e.to_string()))?
            .expect_json::<GenerateContentResponse>()
            .send(move |result| callback(gemini::decode_http(result)));
        Ok(())
    }

    fn submit_batch(model: &mut Model, caps: &Capabilities, batch: Batch) {
        if model.service.is_none() {
            let error =
                AppError::new(ErrorKind::Configuration, "batch submitted before configure");
            warn!(error = %error, "analysis not started");
            model.screen = Screen::Upload { error: Some(error) };
            return;
        }

        let batch_id = batch.id.clone();
        info!(batch_id = %batch_id, images = batch.len(), "batch submitted");
        for (index, image) in batch.images().iter().enumerate() {
            let batch_id = batch_id.clone();
            caps.files.read(image.id.clone(), move |result| Event::ImageRead {
                batch_id,
                index,
                result,
            });
        }
        Self::apply(model, ScreenEvent::Submit(batch));
        Self::apply(model, ScreenEvent::Dispatched);
    }

    fn send_analysis(
        model: &Model,
        caps: &Capabilities,
        batch_id: BatchId,
        images: Vec<InlineData>,
    ) -> Result<(), ServiceError> {
        let service = model.service.as_ref().ok_or(ServiceError::NotConfigured)?;
        let rate = service.cost_per_million_tokens;
        info!(
            batch_id = %batch_id,
            images = images.len(),
            model = %service.analysis_model,
            "sending analysis request"
        );
        Self::post(
            service,
            caps,
            &service.analysis_model,
            &gemini::analysis_request(images),
            move |result| Event::AnalysisCompleted {
                batch_id,
                result: result.map(|response| Box::new(gemini::analysis_result(&response, rate))),
            },
        )
    }

    fn schedule_tick(model: &Model, caps: &Capabilities, batch_id: &BatchId, generation: u64) {
        let event_batch = batch_id.clone();
        caps.timer.start(
            progress_timer_id(batch_id),
            model.progress_config.tick_interval_ms,
            move |_| Event::ProgressTick {
                batch_id: event_batch,
                generation,
            },
        );
    }

    fn fail_analysis(model: &mut Model, caps: &Capabilities, batch_id: &BatchId, error: AppError) {
        let ticking = model
            .screen
            .processing()
            .and_then(|p| p.progress.running_generation())
            .is_some();
        if ticking {
            caps.timer.clear(progress_timer_id(batch_id));
        }
        warn!(batch_id = %batch_id, error = %error, "analysis failed");
        Self::apply(model, ScreenEvent::Failed(error));
    }

    fn stop_playback(caps: &Capabilities, handle: PlaybackHandle) {
        // A handle still synthesizing has nothing playing yet; its late
        // audio is dropped by token mismatch.
        if handle.state == PlaybackState::Playing {
            caps.audio.stop(handle.token);
        }
    }

    fn submit_chat(model: &mut Model, caps: &Capabilities, text: &str) {
        let Some(analysis) = model.screen.analysis_mut() else {
            return;
        };
        let Some(pending) = analysis.chat.send_message(text) else {
            debug!("chat message rejected");
            return;
        };

        let sent = serde_json::to_string(&analysis.result.data)
            .map_err(|e| ServiceError::Request(format!("report context: {e}")))
            .and_then(|context| {
                let body = gemini::chat_request(&context, &pending.history, &pending.message);
                let request_id = pending.request_id.clone();
                info!(request_id = %request_id, history = pending.history.len(), "sending chat message");

                match model.service.as_ref() {
                    Some(service) => {
                        Self::post(service, caps, &service.chat_model, &body, move |result| {
                            Event::ChatReplied {
                                request_id,
                                result: result.and_then(|response| gemini::chat_reply(&response)),
                            }
                        })
                    }
                    None => Err(ServiceError::NotConfigured),
                }
            });
        if let Err(e) = sent {
            warn!(error = %AppError::new(ErrorKind::ChatFailure, e.to_string()), "chat request not sent");
            analysis.chat.receive_reply(&pending.request_id, Err(e));
        }
    }

    fn transcribe(
        model: &mut Model,
        caps: &Capabilities,
        batch_id: BatchId,
        audio: &RecordedAudio,
    ) {
        let Some(analysis) = model.screen.analysis_mut() else {
            return;
        };
        let sent = match model.service.as_ref() {
            Some(service) => Self::post(
                service,
                caps,
                &service.transcription_model,
                &gemini::transcription_request(audio),
                move |result| Event::TranscriptionCompleted {
                    batch_id,
                    result: result.map(|response| gemini::transcript(&response)),
                },
            ),
            None => Err(ServiceError::NotConfigured),
        };
        match sent {
            Ok(()) => analysis.chat.begin_transcription(),
            Err(e) => warn!(
                error = %AppError::new(ErrorKind::TranscriptionFailure, e.to_string()),
                "transcription not sent"
            ),
        }
    }

    fn synthesize(model: &mut Model, caps: &Capabilities, token: PlaybackToken, text: &str) {
        let Some(analysis) = model.screen.analysis_mut() else {
            return;
        };
        let callback_token = token.clone();
        let sent = match model.service.as_ref() {
            Some(service) => Self::post(
                service,
                caps,
                &service.speech_model,
                &gemini::speech_request(text, &service.voice),
                move |result| Event::SpeechSynthesized {
                    token: callback_token,
                    result: result.and_then(|response| gemini::speech_audio(&response)),
                },
            ),
            None => Err(ServiceError::NotConfigured),
        };
        if let Err(e) = sent {
            warn!(
                error = %AppError::new(ErrorKind::SynthesisFailure, e.to_string()),
                "speech request not sent"
            );
            analysis.chat.release_playback(&token);
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(event = event.name(), screen = model.screen.name(), "update");

        match event {
            Event::Configure(settings) => {
                if let Some(ms) = settings.settle_delay_ms {
                    model.settle_delay_ms = ms;
                }
                match ServiceConfig::try_from(*settings) {
                    Ok(service) => {
                        info!(base_url = %service.base_url, "service configured");
                        model.service = Some(service);
                    }
                    Err(e) => {
                        warn!(error = %AppError::new(ErrorKind::Configuration, e.to_string()), "invalid service settings");
                        model.service = None;
                    }
                }
                caps.render.render();
            }

            Event::FilesSelected(images) => {
                if model.screen.analysis().is_some() || model.screen.processing().is_some() {
                    debug!("files selected outside upload, ignored");
                    return;
                }
                let Some(batch) = Batch::new(images) else {
                    debug!("empty selection ignored");
                    return;
                };
                Self::submit_batch(model, caps, batch);
                caps.render.render();
            }

            Event::ImageRead {
                batch_id,
                index,
                result,
            } => {
                if !Self::is_processing(model, &batch_id) {
                    debug!(batch_id = %batch_id, index, "stale image read ignored");
                    return;
                }
                match result {
                    Ok(contents) => {
                        let data = InlineData::encode(&contents.mime_type, &contents.bytes);
                        Self::apply(model, ScreenEvent::ImageStaged { index, data });

                        let ready = model.screen.processing_mut().and_then(|p| p.take_ready());
                        if let Some(images) = ready {
                            match Self::send_analysis(model, caps, batch_id.clone(), images) {
                                Ok(()) => {
                                    let generation = model
                                        .screen
                                        .processing()
                                        .and_then(|p| p.progress.running_generation());
                                    if let Some(generation) = generation {
                                        Self::schedule_tick(model, caps, &batch_id, generation);
                                    }
                                }
                                Err(e) => {
                                    let error = AppError::new(ErrorKind::AnalysisFailure, e.to_string());
                                    Self::fail_analysis(model, caps, &batch_id, error);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let error = AppError::new(
                            ErrorKind::AnalysisFailure,
                            format!("image {index} could not be read: {e}"),
                        );
                        Self::fail_analysis(model, caps, &batch_id, error);
                    }
                }
                caps.render.render();
            }

            Event::ProgressTick {
                batch_id,
                generation,
            } => {
                if !Self::is_processing(model, &batch_id) {
                    return;
                }
                let fraction = model.increments.next_fraction();
                Self::apply(model, ScreenEvent::Tick { generation, fraction });
                let still_running = model
                    .screen
                    .processing()
                    .and_then(|p| p.progress.running_generation())
                    == Some(generation);
                if still_running {
                    Self::schedule_tick(model, caps, &batch_id, generation);
                }
                caps.render.render();
            }

            Event::AnalysisCompleted { batch_id, result } => {
                let pending = model
                    .screen
                    .processing()
                    .is_some_and(|p| p.batch.id == batch_id && p.outcome().is_none());
                if !pending {
                    debug!(batch_id = %batch_id, "stale analysis result ignored");
                    return;
                }
                match result {
                    Ok(result) => {
                        info!(
                            batch_id = %batch_id,
                            tokens = result.tokens,
                            species = result.data.species_analysis.len(),
                            anomalies = result.data.anomalies.len(),
                            "analysis completed"
                        );
                        caps.timer.clear(progress_timer_id(&batch_id));
                        Self::apply(model, ScreenEvent::Succeeded(result));
                        let settle_batch = batch_id.clone();
                        caps.timer.start(
                            settle_timer_id(&batch_id),
                            model.settle_delay_ms,
                            move |_| Event::SettleElapsed {
                                batch_id: settle_batch,
                            },
                        );
                    }
                    Err(e) => {
                        let error = AppError::new(ErrorKind::AnalysisFailure, e.to_string());
                        Self::fail_analysis(model, caps, &batch_id, error);
                    }
                }
                caps.render.render();
            }

            Event::SettleElapsed { batch_id } => {
                if Self::is_processing(model, &batch_id) {
                    Self::apply(model, ScreenEvent::Settled);
                    caps.render.render();
                }
            }

            Event::NewAnalysisRequested => {
                let Some(analysis) = model.screen.analysis_mut() else {
                    return;
                };
                let released = analysis.chat.close();
                if let Some(token) = released.playback {
                    caps.audio.stop(token);
                }
                if released.recording {
                    let batch_id = analysis.batch.id.clone();
                    caps.audio.stop_recording(move |result| Event::RecordingFinished {
                        batch_id,
                        result,
                    });
                }
                Self::apply(model, ScreenEvent::Reset);
                caps.render.render();
            }

            Event::ViewModeSelected(mode) => {
                Self::apply(model, ScreenEvent::SelectViewMode(mode));
                caps.render.render();
            }

            Event::SpeciesToggled { species_name } => {
                Self::apply(model, ScreenEvent::ToggleSpecies(species_name));
                caps.render.render();
            }

            Event::SelectionCleared => {
                Self::apply(model, ScreenEvent::ClearSelection);
                caps.render.render();
            }

            Event::ExportRequested => {
                if let Some(analysis) = model.screen.analysis() {
                    let file = report::export_file(&analysis.result);
                    info!(filename = %file.filename, bytes = file.contents.len(), "exporting report");
                    caps.export.save(file);
                }
            }

            Event::ChatToggled => {
                Self::apply(model, ScreenEvent::ToggleChat);
                caps.render.render();
            }

            Event::ChatSubmitted { text } => {
                Self::submit_chat(model, caps, &text);
                caps.render.render();
            }

            Event::ChatReplied { request_id, result } => {
                let Some(analysis) = model.screen.analysis_mut() else {
                    return;
                };
                if let Err(e) = &result {
                    warn!(
                        request_id = %request_id,
                        error = %AppError::new(ErrorKind::ChatFailure, e.to_string()),
                        "chat request failed"
                    );
                }
                if analysis.chat.receive_reply(&request_id, result) {
                    caps.render.render();
                } else {
                    debug!(request_id = %request_id, "stale chat reply ignored");
                }
            }

            Event::MicToggled => {
                let Some(analysis) = model.screen.analysis_mut() else {
                    return;
                };
                let batch_id = analysis.batch.id.clone();
                match analysis.chat.toggle_mic() {
                    MicAction::StartRecording => {
                        caps.audio.start_recording(move |result| Event::RecordingStarted {
                            batch_id,
                            result,
                        });
                    }
                    MicAction::StopRecording => {
                        caps.audio.stop_recording(move |result| Event::RecordingFinished {
                            batch_id,
                            result,
                        });
                    }
                    MicAction::Ignored => {}
                }
                caps.render.render();
            }

            Event::RecordingStarted { batch_id, result } => {
                if !Self::is_analysis(model, &batch_id) {
                    // Granted after its session closed: nobody owns it.
                    if result.is_ok() {
                        debug!(batch_id = %batch_id, "stopping orphaned recording");
                        caps.audio.stop_recording(move |result| Event::RecordingFinished {
                            batch_id,
                            result,
                        });
                    }
                    return;
                }
                let Some(analysis) = model.screen.analysis_mut() else {
                    return;
                };
                if let Err(e) = &result {
                    warn!(
                        error = %AppError::new(ErrorKind::MicAccessDenied, e.to_string()),
                        "recording not started"
                    );
                }
                analysis.chat.recording_started(result.is_ok());
                caps.render.render();
            }

            Event::RecordingFinished { batch_id, result } => {
                if !Self::is_analysis(model, &batch_id) {
                    debug!(batch_id = %batch_id, "recording from a closed session dropped");
                    return;
                }
                match result {
                    Ok(audio) => {
                        debug!(bytes = audio.bytes.len(), "recording finished");
                        Self::transcribe(model, caps, batch_id, &audio);
                    }
                    Err(e) => warn!(
                        error = %AppError::new(ErrorKind::TranscriptionFailure, e.to_string()),
                        "recording lost"
                    ),
                }
                caps.render.render();
            }

            Event::TranscriptionCompleted { batch_id, result } => {
                if !Self::is_analysis(model, &batch_id) {
                    return;
                }
                if let Some(analysis) = model.screen.analysis_mut() {
                    analysis.chat.end_transcription();
                }
                match result {
                    Ok(text) if !text.is_empty() => Self::submit_chat(model, caps, &text),
                    Ok(_) => debug!("transcription was empty"),
                    Err(e) => warn!(
                        error = %AppError::new(ErrorKind::TranscriptionFailure, e.to_string()),
                        "transcription failed"
                    ),
                }
                caps.render.render();
            }

            Event::SpeakRequested { message_id } => {
                let Some(analysis) = model.screen.analysis_mut() else {
                    return;
                };
                match analysis.chat.speak(&message_id) {
                    SpeakAction::Stopped(handle) => Self::stop_playback(caps, handle),
                    SpeakAction::Start {
                        stopped,
                        token,
                        text,
                    } => {
                        if let Some(handle) = stopped {
                            Self::stop_playback(caps, handle);
                        }
                        debug!(message_id = %message_id, token = %token, "synthesizing speech");
                        Self::synthesize(model, caps, token, &text);
                    }
                    SpeakAction::Ignored => {
                        debug!(message_id = %message_id, "unknown message cannot be spoken");
                    }
                }
                caps.render.render();
            }

            Event::SpeechSynthesized { token, result } => {
                let Some(analysis) = model.screen.analysis_mut() else {
                    return;
                };
                match result {
                    Ok(clip) => {
                        if analysis.chat.audio_ready(&token) {
                            let ended = token.clone();
                            caps.audio.play(token, clip, move |_| Event::PlaybackEnded {
                                token: ended,
                            });
                        } else {
                            debug!(token = %token, "superseded speech dropped");
                        }
                    }
                    Err(e) => {
                        warn!(
                            error = %AppError::new(ErrorKind::SynthesisFailure, e.to_string()),
                            "speech synthesis failed"
                        );
                        analysis.chat.release_playback(&token);
                    }
                }
                caps.render.render();
            }

            Event::PlaybackEnded { token } => {
                let released = model
                    .screen
                    .analysis_mut()
                    .is_some_and(|a| a.chat.release_playback(&token));
                if released {
                    caps.render.render();
                }
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel::build(&model.screen, model.service.is_some())
    }
}
