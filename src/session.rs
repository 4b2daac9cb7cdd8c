//! Connection session: attaches redaction to inbound video tracks and tears
//! every track down when the connection ends.
//!
//! The transport layer owns signalling and media. It reports what happens on
//! the connection as [`SessionEvent`] messages and receives redacting
//! [`TrackAdapter`]s on the outbound channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::compositor::BlurCompositor;
use crate::config::RedactConfig;
use crate::detect::DetectorSet;
use crate::track::{CleanupHandle, FrameSource, TrackAdapter};

const EVENT_QUEUE_CAPACITY: usize = 16;

/// Peer connection states, as reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// States after which the connection carries no more media.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// Track announced by the remote peer.
pub enum InboundTrack {
    Video {
        id: String,
        source: Box<dyn FrameSource>,
    },
    Audio {
        id: String,
    },
}

pub enum SessionEvent {
    Track(InboundTrack),
    ConnectionStateChange(ConnectionState),
}

/// Redacting track ready to be added to the outgoing side of the connection.
pub struct OutboundTrack {
    pub id: String,
    pub adapter: TrackAdapter,
}

/// Tracks owned by one session, keyed by track id.
#[derive(Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<String, CleanupHandle>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track. A previous track with the same id is cleaned up.
    pub fn insert(&mut self, id: String, handle: CleanupHandle) {
        if let Some(previous) = self.tracks.insert(id.clone(), handle) {
            log::warn!("track {} re-announced; cleaning up previous instance", id);
            previous.cleanup();
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Stop and forget every track. Returns how many were cleaned up.
    pub fn cleanup_all(&mut self) -> usize {
        let tracks = std::mem::take(&mut self.tracks);
        let count = tracks.len();
        for (id, handle) in tracks {
            handle.cleanup();
            log::info!("track {} cleaned up", id);
        }
        count
    }
}

/// What a finished session did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Video tracks announced by the peer.
    pub video_tracks: usize,
    /// Video tracks that could not be wrapped or handed to the transport.
    pub rejected_tracks: usize,
    pub ignored_tracks: usize,
    pub cleaned_up: usize,
    pub final_state: Option<ConnectionState>,
}

/// One peer connection's worth of redaction.
pub struct Session {
    id: String,
    config: RedactConfig,
    detectors: DetectorSet,
    compositor: Arc<BlurCompositor>,
    events: mpsc::Receiver<SessionEvent>,
    outbound: mpsc::Sender<OutboundTrack>,
    registry: TrackRegistry,
}

impl Session {
    /// Build a session and the sender the transport reports events on.
    ///
    /// The transport must keep `outbound` drained: a track that does not fit
    /// is cleaned up at once so the session never waits on the transport.
    pub fn new(
        id: impl Into<String>,
        config: RedactConfig,
        detectors: DetectorSet,
        outbound: mpsc::Sender<OutboundTrack>,
    ) -> Result<(Self, mpsc::Sender<SessionEvent>)> {
        let compositor = Arc::new(BlurCompositor::new(&config)?);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let session = Self {
            id: id.into(),
            config,
            detectors,
            compositor,
            events: events_rx,
            outbound,
            registry: TrackRegistry::new(),
        };
        Ok((session, events_tx))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Process events until the connection reaches a terminal state or the
    /// event stream ends. Every track is cleaned up before returning.
    pub async fn run(mut self) -> SessionSummary {
        let mut summary = SessionSummary::default();

        while let Some(event) = self.events.recv().await {
            match event {
                SessionEvent::Track(InboundTrack::Video { id, source }) => {
                    summary.video_tracks += 1;
                    if !self.attach_video(id, source) {
                        summary.rejected_tracks += 1;
                    }
                }
                SessionEvent::Track(InboundTrack::Audio { id }) => {
                    log::info!("session {}: audio track {} passed over", self.id, id);
                    summary.ignored_tracks += 1;
                }
                SessionEvent::ConnectionStateChange(state) => {
                    log::info!("session {}: connection state {:?}", self.id, state);
                    summary.final_state = Some(state);
                    if state.is_terminal() {
                        break;
                    }
                }
            }
        }

        summary.cleaned_up = self.registry.cleanup_all();
        log::info!(
            "session {} ended: {} video tracks, {} rejected, {} cleaned up",
            self.id,
            summary.video_tracks,
            summary.rejected_tracks,
            summary.cleaned_up
        );
        summary
    }

    /// Wrap a video track and hand it to the transport. Returns false when
    /// the track could not be attached; nothing of it is left running then.
    fn attach_video(&mut self, id: String, source: Box<dyn FrameSource>) -> bool {
        let adapter = match TrackAdapter::new(
            source,
            self.detectors.clone(),
            self.compositor.clone(),
            &self.config,
        ) {
            Ok(adapter) => adapter,
            Err(e) => {
                log::error!(
                    "session {}: cannot redact video track {}: {:#}",
                    self.id,
                    id,
                    e
                );
                return false;
            }
        };
        let handle = adapter.cleanup_handle();

        let track = OutboundTrack {
            id: id.clone(),
            adapter,
        };
        match self.outbound.try_send(track) {
            Ok(()) => {
                self.registry.insert(id.clone(), handle);
                log::info!("session {}: redacting video track {}", self.id, id);
                true
            }
            Err(e) => {
                let reason = match e {
                    TrySendError::Full(_) => "outbound full",
                    TrySendError::Closed(_) => "outbound closed",
                };
                log::warn!("session {}: {}, dropping track {}", self.id, reason, id);
                handle.cleanup();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::NoText;
    use crate::ingest::ChannelSource;
    use std::time::Duration;

    fn adapter(config: &RedactConfig) -> TrackAdapter {
        let (_tx, source) = ChannelSource::pair(1);
        let compositor = Arc::new(BlurCompositor::new(config).unwrap());
        let detectors = DetectorSet::new(Arc::new(NoText), None);
        TrackAdapter::new(Box::new(source), detectors, compositor, config).unwrap()
    }

    #[test]
    fn reannounced_track_stops_previous_instance() {
        let config = RedactConfig {
            poll_timeout: Duration::from_millis(10),
            ..RedactConfig::default()
        };
        let first = adapter(&config);
        let second = adapter(&config);
        let mut registry = TrackRegistry::new();
        assert!(registry.is_empty());

        registry.insert("cam".to_string(), first.cleanup_handle());
        registry.insert("cam".to_string(), second.cleanup_handle());
        assert_eq!(registry.len(), 1);
        assert!(!first.cleanup_handle().is_active());
        assert!(second.cleanup_handle().is_active());

        assert_eq!(registry.cleanup_all(), 1);
        assert!(registry.is_empty());
        assert!(!second.cleanup_handle().is_active());
    }

    #[test]
    fn only_failed_and_closed_are_terminal() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
    }
}
