//! Frame pipeline: stamps captured frames and fans them out to subscribers.

use std::sync::Arc;

use keycast_core::{FrameSequence, Message};
use tokio::sync::mpsc;
use tracing::debug;

use super::CapturedFrame;
use crate::network::session_manager::SessionManager;

/// Consumes captured frames and broadcasts them to screen-share subscribers.
///
/// Frames arriving while no peer is subscribed are dropped immediately, never
/// queued; a late subscriber starts with the next fresh frame rather than a
/// backlog of stale ones. Frame ids are correlation tags for acks only; there
/// is no retransmission or send window.
pub struct FramePipeline {
    sessions: SessionManager,
    sequence: Arc<FrameSequence>,
}

impl FramePipeline {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions,
            sequence: Arc::new(FrameSequence::new()),
        }
    }

    /// The sequence counter used to stamp outgoing frames.
    pub fn sequence(&self) -> &FrameSequence {
        &self.sequence
    }

    /// Drives the pipeline until the capture channel closes.
    pub async fn run(&self, mut frames: mpsc::Receiver<CapturedFrame>) {
        while let Some(frame) = frames.recv().await {
            if self.sessions.subscriber_count().await == 0 {
                debug!("no screen-share subscribers, dropping frame");
                continue;
            }

            let frame_id = self.sequence.next();
            self.sessions
                .broadcast_to_subscribers(Message::ScreenFrame {
                    frame_id,
                    width: frame.width,
                    height: frame.height,
                    image_data: frame.image_data,
                })
                .await;
        }
        debug!("frame pipeline stopped: capture channel closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session_manager::SessionConfig;

    async fn test_manager() -> SessionManager {
        let config = SessionConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..SessionConfig::default()
        };
        let (mgr, _rx) = SessionManager::start(config, None).await.expect("start");
        // The receiver is dropped; events are discarded.
        mgr
    }

    #[tokio::test]
    async fn test_frames_without_subscribers_do_not_consume_sequence_ids() {
        let mgr = test_manager().await;
        let pipeline = FramePipeline::new(mgr.clone());
        let (tx, rx) = mpsc::channel(8);

        tx.send(CapturedFrame {
            width: 8,
            height: 8,
            image_data: vec![0; 16],
        })
        .await
        .unwrap();
        drop(tx);
        pipeline.run(rx).await;

        // The frame was dropped before stamping.
        assert_eq!(pipeline.sequence().current(), 0);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_run_finishes_when_capture_channel_closes() {
        let mgr = test_manager().await;
        let pipeline = FramePipeline::new(mgr.clone());
        let (tx, rx) = mpsc::channel::<CapturedFrame>(1);

        drop(tx);
        // Must return rather than hang.
        pipeline.run(rx).await;
        mgr.stop().await;
    }
}
