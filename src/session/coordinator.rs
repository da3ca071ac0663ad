use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::{recording_indicator, FailureNotifier, SessionEvent};
use super::session::Session;
use super::stats::SessionStatus;
use crate::capture::{CaptureSource, StreamAcquirer};
use crate::error::RecorderError;
use crate::media::{EncoderFactory, MediaStream, StreamKind};
use crate::mirror::NetworkMirror;
use crate::persistence::{PersistenceSink, SaveReport};
use crate::pipeline::{lock, Pipeline};

const EVENT_CAPACITY: usize = 64;

/// Coordinator lifecycle: `Idle -> Starting -> Active -> Stopping -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

/// A secondary stream that did not start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDegradation {
    pub kind: StreamKind,
    pub reason: String,
}

/// Result of a successful start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOutcome {
    pub session_id: String,
    pub active_streams: Vec<StreamKind>,
    pub degraded: Vec<StreamDegradation>,
    pub indicator: String,
}

/// Owns the one recording session a process may run
///
/// Start and stop requests are serialized through the phase: a start is only
/// accepted from `Idle`, a stop only from `Active`. Everything else is
/// rejected without touching the session in progress.
pub struct SessionCoordinator {
    acquirer: StreamAcquirer,
    encoders: Arc<dyn EncoderFactory>,
    sink: PersistenceSink,
    mirror: Option<NetworkMirror>,
    config: SessionConfig,
    phase: Mutex<SessionPhase>,
    session: tokio::sync::Mutex<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionCoordinator {
    pub fn new(
        acquirer: StreamAcquirer,
        encoders: Arc<dyn EncoderFactory>,
        sink: PersistenceSink,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            acquirer,
            encoders,
            sink,
            mirror: None,
            config,
            phase: Mutex::new(SessionPhase::Idle),
            session: tokio::sync::Mutex::new(None),
            events,
        }
    }

    /// Mirror every started stream over `mirror`
    pub fn with_mirror(mut self, mirror: NetworkMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        *lock(&self.phase)
    }

    fn transition(&self, from: SessionPhase, to: SessionPhase) -> Result<(), SessionPhase> {
        let mut phase = lock(&self.phase);
        if *phase != from {
            return Err(*phase);
        }

        *phase = to;
        Ok(())
    }

    fn set_phase(&self, to: SessionPhase) {
        *lock(&self.phase) = to;
    }

    fn notify(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Start recording `source`
    ///
    /// The display stream is mandatory; system audio and microphone are
    /// started concurrently afterwards and their failures only degrade the
    /// session. The start runs on its own task, so dropping the returned
    /// future never leaves the coordinator stuck in `Starting`.
    pub async fn start_session(
        self: &Arc<Self>,
        source: &CaptureSource,
    ) -> Result<StartOutcome, RecorderError> {
        let coordinator = Arc::clone(self);
        let source = source.clone();
        let task = tokio::spawn(async move { coordinator.run_start(&source).await });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(RecorderError::Interrupted(e.to_string())),
        }
    }

    async fn run_start(&self, source: &CaptureSource) -> Result<StartOutcome, RecorderError> {
        if let Err(phase) = self.transition(SessionPhase::Idle, SessionPhase::Starting) {
            warn!("Recording already in progress ({:?}), start ignored", phase);
            self.notify(SessionEvent::Busy);
            return Err(RecorderError::SessionBusy);
        }

        let mut session = Session::new(Utc::now());
        info!("Starting separate recordings with session ID: {}", session.id());

        match self.start_streams(&mut session, source).await {
            Ok(outcome) => {
                *self.session.lock().await = Some(session);
                self.set_phase(SessionPhase::Active);

                info!("{}", outcome.indicator);
                self.notify(SessionEvent::Started {
                    session_id: outcome.session_id.clone(),
                    streams: outcome.active_streams.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                drop(session);
                self.set_phase(SessionPhase::Idle);
                self.notify(SessionEvent::StartFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn start_streams(
        &self,
        session: &mut Session,
        source: &CaptureSource,
    ) -> Result<StartOutcome, RecorderError> {
        session.request(StreamKind::Video);
        let display = self.acquirer.acquire_display_stream(source).await?;
        let video = self.start_pipeline(StreamKind::Video, display).await?;
        session.bind_pipeline(video).await;

        let secondary: Vec<StreamKind> = StreamKind::ALL
            .iter()
            .copied()
            .filter(|kind| !kind.is_primary())
            .collect();
        for kind in &secondary {
            session.request(*kind);
        }
        let results = join_all(secondary.iter().map(|kind| self.start_secondary(*kind))).await;

        let mut degraded = Vec::new();
        for (kind, result) in secondary.into_iter().zip(results) {
            match result {
                Ok(pipeline) => session.bind_pipeline(pipeline).await,
                Err(e) => {
                    warn!("{} recording not started, continuing without it: {}", kind, e);
                    let reason = e.to_string();
                    self.notify(SessionEvent::Degraded {
                        kind,
                        reason: reason.clone(),
                    });
                    degraded.push(StreamDegradation { kind, reason });
                }
            }
        }

        let active_streams = session.active_streams();
        if let Some(mirror) = &self.mirror {
            for kind in &active_streams {
                let connection = mirror.connect(*kind, session.id());
                session.attach_mirror(connection);
            }
        }

        Ok(StartOutcome {
            session_id: session.id().to_string(),
            indicator: recording_indicator(&active_streams),
            active_streams,
            degraded,
        })
    }

    async fn start_secondary(&self, kind: StreamKind) -> Result<Pipeline, RecorderError> {
        let stream = if kind == StreamKind::SystemAudio {
            self.acquirer.acquire_system_audio_stream().await?
        } else {
            self.acquirer.acquire_microphone_stream().await?
        };

        self.start_pipeline(kind, stream).await
    }

    async fn start_pipeline(
        &self,
        kind: StreamKind,
        stream: MediaStream,
    ) -> Result<Pipeline, RecorderError> {
        let mut pipeline = Pipeline::new(kind, self.config.drain_timeout);
        pipeline.subscribe(Arc::new(FailureNotifier::new(self.events.clone())));
        pipeline
            .start(stream, self.encoders.as_ref(), self.config.chunk_interval)
            .await?;

        Ok(pipeline)
    }

    /// Stop every stream, save what was recorded and return to `Idle`
    ///
    /// Returns `None` when no session was active. Teardown and saving run on
    /// their own task and complete even if the caller goes away.
    pub async fn stop_session(self: &Arc<Self>) -> Option<SaveReport> {
        let coordinator = Arc::clone(self);
        let task = tokio::spawn(async move { coordinator.run_stop().await });

        match task.await {
            Ok(report) => report,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!("Stop task interrupted: {}", e);
                None
            }
        }
    }

    async fn run_stop(&self) -> Option<SaveReport> {
        if let Err(phase) = self.transition(SessionPhase::Active, SessionPhase::Stopping) {
            debug!("No active recording ({:?}), stop ignored", phase);
            return None;
        }

        let Some(mut session) = self.session.lock().await.take() else {
            self.set_phase(SessionPhase::Idle);
            return None;
        };
        info!("Stopping all recordings for session {}", session.id());

        // Pipelines drain before mirrors close so the final chunks are forwarded
        session.stop_pipelines().await;
        session.disconnect_mirrors().await;

        let blobs = session.assemble_blobs();
        let metadata = session.metadata(Utc::now());
        let report = self.sink.save(&blobs, &metadata).await;

        if report.success {
            info!(
                "All recordings saved: {} file(s) in {}",
                report.files_saved,
                report.directory.as_deref().unwrap_or_default()
            );
            if let Some(partial) = report.partial_failure() {
                warn!("{}", partial);
            }
            self.notify(SessionEvent::Saved {
                report: report.clone(),
            });
        } else {
            error!(
                "Failed to save recordings: {}",
                report.error.as_deref().unwrap_or("unknown error")
            );
            self.notify(SessionEvent::SaveFailed {
                report: report.clone(),
            });
        }

        let session_id = session.id().to_string();
        drop(session);
        self.set_phase(SessionPhase::Idle);
        self.notify(SessionEvent::Stopped { session_id });

        Some(report)
    }

    /// Kinds currently recording; empty when no session is active
    pub async fn active_streams(&self) -> Vec<StreamKind> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(Session::active_streams)
            .unwrap_or_default()
    }

    pub async fn status(&self) -> SessionStatus {
        let phase = self.phase();
        let session = self.session.lock().await;

        match session.as_ref() {
            Some(session) => {
                let active_streams = session.active_streams();
                let elapsed = Utc::now() - session.started_at();

                SessionStatus {
                    phase,
                    session_id: Some(session.id().to_string()),
                    requested_streams: session.streams_requested(),
                    started_at: Some(session.started_at()),
                    duration_secs: elapsed.num_milliseconds().max(0) as f64 / 1000.0,
                    indicator: recording_indicator(&active_streams),
                    active_streams,
                    streams: session.stream_stats(),
                }
            }
            None => SessionStatus {
                phase,
                session_id: None,
                requested_streams: Vec::new(),
                started_at: None,
                duration_secs: 0.0,
                active_streams: Vec::new(),
                streams: Vec::new(),
                indicator: recording_indicator(&[]),
            },
        }
    }

    /// Stop and save any active session before the process exits
    pub async fn shutdown(self: &Arc<Self>) -> Option<SaveReport> {
        if self.phase() != SessionPhase::Active {
            return None;
        }

        info!("Shutting down, saving active recording");
        self.stop_session().await
    }
}
