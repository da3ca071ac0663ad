use chrono::{DateTime, Local, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use super::stats::StreamStats;
use crate::media::{mime_preference, StreamKind};
use crate::mirror::MirrorConnection;
use crate::persistence::{RecordedBlob, SessionMetadata};
use crate::pipeline::{assemble_chunks, Pipeline, PipelineState};

/// `recording_YYYYMMDD_HHMMSS` in local time
pub fn session_id_for(time: DateTime<Local>) -> String {
    time.format("recording_%Y%m%d_%H%M%S").to_string()
}

/// One recording run: its identity, pipelines and mirrors
pub struct Session {
    /// Shared identifier for every file of the run
    id: String,

    /// When the recording started
    started_at: DateTime<Utc>,

    /// Streams the coordinator tried to start
    requested: BTreeSet<StreamKind>,

    /// At most one pipeline per kind
    pipelines: BTreeMap<StreamKind, Pipeline>,

    /// Live mirrors, one per mirrored stream
    mirrors: BTreeMap<StreamKind, MirrorConnection>,
}

impl Session {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: session_id_for(started_at.with_timezone(&Local)),
            started_at,
            requested: BTreeSet::new(),
            pipelines: BTreeMap::new(),
            mirrors: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn request(&mut self, kind: StreamKind) {
        self.requested.insert(kind);
    }

    pub fn streams_requested(&self) -> Vec<StreamKind> {
        self.requested.iter().copied().collect()
    }

    /// Attach a started pipeline, stopping any still-live pipeline of the
    /// same kind first so two never record one stream
    pub async fn bind_pipeline(&mut self, pipeline: Pipeline) {
        let kind = pipeline.kind();
        if let Some(mut previous) = self.pipelines.remove(&kind) {
            if previous.is_live() {
                previous.force_stop().await;
            }
        }

        self.pipelines.insert(kind, pipeline);
    }

    /// Kinds whose pipeline is currently recording
    pub fn active_streams(&self) -> Vec<StreamKind> {
        self.pipelines
            .iter()
            .filter(|(_, pipeline)| pipeline.state() == PipelineState::Recording)
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Subscribe a mirror to its pipeline's chunks
    pub fn attach_mirror(&mut self, connection: MirrorConnection) {
        let kind = connection.kind();
        let Some(pipeline) = self.pipelines.get(&kind) else {
            warn!("No {} pipeline to mirror", kind);
            return;
        };

        pipeline.subscribe(connection.forwarder());
        self.mirrors.insert(kind, connection);
    }

    /// Stop every pipeline concurrently and wait for each to drain
    pub async fn stop_pipelines(&mut self) {
        let stops = self
            .pipelines
            .iter_mut()
            .map(|(kind, pipeline)| async move { (*kind, pipeline.stop().await) });

        for (kind, result) in join_all(stops).await {
            if let Err(e) = result {
                warn!("Error stopping {} recorder: {:#}", kind, e);
            }
        }
    }

    /// Send end markers and close every mirror
    pub async fn disconnect_mirrors(&mut self) {
        let closes = self.mirrors.values_mut().map(|mirror| mirror.disconnect());
        join_all(closes).await;
    }

    /// One blob per stopped pipeline that produced data
    pub fn assemble_blobs(&self) -> BTreeMap<StreamKind, RecordedBlob> {
        let mut blobs = BTreeMap::new();

        for (kind, pipeline) in &self.pipelines {
            let Some(chunks) = pipeline.drained_chunks() else {
                info!("{} recording ended {:?}, nothing to save", kind, pipeline.state());
                continue;
            };

            let Some(data) = assemble_chunks(&chunks) else {
                info!("{} recording produced no data", kind);
                continue;
            };

            let mime_type = pipeline
                .mime_type()
                .or_else(|| mime_preference(*kind).last().copied())
                .unwrap_or_default();
            blobs.insert(*kind, RecordedBlob::new(data, mime_type));
        }

        blobs
    }

    pub fn metadata(&self, ended_at: DateTime<Utc>) -> SessionMetadata {
        SessionMetadata::new(self.id.clone(), self.started_at, ended_at)
    }

    pub fn stream_stats(&self) -> Vec<StreamStats> {
        self.pipelines
            .iter()
            .map(|(kind, pipeline)| StreamStats {
                kind: *kind,
                state: pipeline.state(),
                mime_type: pipeline.mime_type().map(str::to_string),
                chunks: pipeline.chunk_count(),
                bytes: pipeline.byte_len(),
                mirror: self.mirrors.get(kind).map(MirrorConnection::state),
            })
            .collect()
    }
}
