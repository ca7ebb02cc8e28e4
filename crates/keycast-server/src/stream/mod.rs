//! Screen streaming: the capture capability trait and the frame pipeline.
//!
//! The engine never touches pixels itself. A platform collaborator implements
//! [`ScreenCapture`] and delivers already-encoded frames; the
//! [`pipeline::FramePipeline`] stamps them with sequence ids and fans them
//! out to subscribed peers.

use tokio::sync::mpsc;

pub mod mock;
pub mod pipeline;

/// One captured, already-encoded screen frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    /// Encoded image bytes (e.g. JPEG); the engine treats them as opaque.
    pub image_data: Vec<u8>,
}

/// Error type for screen capture operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("capture is already running")]
    AlreadyRunning,
    #[error("capture backend failure: {0}")]
    Backend(String),
}

/// Trait abstracting screen frame production.
///
/// Production implementations wrap an OS capture API; tests use
/// [`mock::MockScreenCapture`].
pub trait ScreenCapture: Send {
    /// Starts capturing at roughly `frame_rate` frames per second and
    /// returns the receiver frames are delivered on.
    fn start(&self, frame_rate: u32) -> Result<mpsc::Receiver<CapturedFrame>, StreamError>;
    /// Stops capturing and closes the frame channel.
    fn stop(&self);
}

/// Clamps a configured capture rate into the supported 1–60 fps range.
pub fn clamp_frame_rate(rate: u32) -> u32 {
    rate.clamp(1, 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_frame_rate_bounds() {
        assert_eq!(clamp_frame_rate(0), 1);
        assert_eq!(clamp_frame_rate(15), 15);
        assert_eq!(clamp_frame_rate(60), 60);
        assert_eq!(clamp_frame_rate(240), 60);
    }
}
