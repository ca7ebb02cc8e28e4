//! Mock screen capture for unit testing.
//!
//! Allows tests to inject synthetic [`CapturedFrame`]s without an OS capture
//! backend.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{CapturedFrame, ScreenCapture, StreamError};

/// A mock implementation of [`ScreenCapture`] that lets tests inject frames.
pub struct MockScreenCapture {
    sender: Arc<Mutex<Option<mpsc::Sender<CapturedFrame>>>>,
}

impl MockScreenCapture {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Injects a synthetic frame, as if captured from the screen.
    ///
    /// Panics if `start()` has not been called or the pipeline has stopped
    /// consuming.
    pub fn inject_frame(&self, frame: CapturedFrame) {
        let guard = self.sender.lock().expect("lock poisoned");
        let sender = guard
            .as_ref()
            .expect("MockScreenCapture::inject_frame called before start()");
        sender
            .try_send(frame)
            .expect("frame receiver is gone or full");
    }
}

impl Default for MockScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCapture for MockScreenCapture {
    fn start(&self, _frame_rate: u32) -> Result<mpsc::Receiver<CapturedFrame>, StreamError> {
        let mut guard = self.sender.lock().expect("lock poisoned");
        if guard.is_some() {
            return Err(StreamError::AlreadyRunning);
        }
        let (tx, rx) = mpsc::channel(32);
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Drop the sender to close the channel.
        *self.sender.lock().expect("lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_capture_delivers_injected_frames() {
        let capture = MockScreenCapture::new();
        let mut rx = capture.start(15).expect("start");

        capture.inject_frame(CapturedFrame {
            width: 640,
            height: 480,
            image_data: vec![1, 2, 3],
        });

        let frame = rx.recv().await.expect("frame expected");
        assert_eq!(frame.width, 640);
        assert_eq!(frame.image_data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_mock_capture_second_start_fails() {
        let capture = MockScreenCapture::new();
        let _rx = capture.start(15).expect("first start");
        assert!(matches!(
            capture.start(15),
            Err(StreamError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_mock_capture_stop_closes_channel() {
        let capture = MockScreenCapture::new();
        let mut rx = capture.start(15).expect("start");

        capture.stop();

        assert!(rx.recv().await.is_none(), "channel must close after stop()");
    }
}
