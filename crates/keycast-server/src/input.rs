//! Input capture capability and the broadcast forwarder.
//!
//! The engine consumes input through the [`InputSource`] trait; a platform
//! collaborator (OS hook, injection test harness) produces [`InputRecord`]s
//! and [`forward_input`] turns them into broadcasts to every authenticated
//! peer.

use tokio::sync::mpsc;
use tracing::debug;

use crate::network::session_manager::SessionManager;

/// One captured input event, in wire-protocol units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRecord {
    /// Keyboard press or release.
    Key { vk_code: i32, pressed: bool },
    /// Mouse button press or release at an absolute position.
    Button {
        x: i32,
        y: i32,
        button: i32,
        pressed: bool,
    },
    /// Absolute cursor movement.
    Motion { x: i32, y: i32 },
}

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input capture is already running")]
    AlreadyRunning,
    #[error("input backend failure: {0}")]
    Backend(String),
}

/// Trait abstracting input event production.
///
/// Production implementations install OS hooks; tests use
/// [`mock::MockInputSource`].
pub trait InputSource: Send {
    /// Starts the source and returns the receiver events are delivered on.
    fn start(&self) -> Result<mpsc::Receiver<InputRecord>, InputError>;
    /// Stops the source and closes the event channel.
    fn stop(&self);
}

/// Forwards captured input records into session broadcasts until the source
/// channel closes.
pub async fn forward_input(sessions: SessionManager, mut records: mpsc::Receiver<InputRecord>) {
    while let Some(record) = records.recv().await {
        match record {
            InputRecord::Key { vk_code, pressed } => {
                sessions.broadcast_key_event(vk_code, pressed).await;
            }
            InputRecord::Button {
                x,
                y,
                button,
                pressed,
            } => {
                sessions.broadcast_mouse_event(x, y, button, pressed).await;
            }
            InputRecord::Motion { x, y } => {
                sessions.broadcast_mouse_move(x, y).await;
            }
        }
    }
    debug!("input forwarder stopped: source channel closed");
}

pub mod mock {
    //! Mock input source for unit testing.

    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::{InputError, InputRecord, InputSource};

    /// A mock implementation of [`InputSource`] that lets tests inject events.
    pub struct MockInputSource {
        sender: Arc<Mutex<Option<mpsc::Sender<InputRecord>>>>,
    }

    impl MockInputSource {
        pub fn new() -> Self {
            Self {
                sender: Arc::new(Mutex::new(None)),
            }
        }

        /// Injects a synthetic event, as if captured from hardware.
        ///
        /// Panics if `start()` has not been called.
        pub fn inject(&self, record: InputRecord) {
            let guard = self.sender.lock().expect("lock poisoned");
            let sender = guard
                .as_ref()
                .expect("MockInputSource::inject called before start()");
            sender.try_send(record).expect("record receiver is gone");
        }
    }

    impl Default for MockInputSource {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InputSource for MockInputSource {
        fn start(&self) -> Result<mpsc::Receiver<InputRecord>, InputError> {
            let mut guard = self.sender.lock().expect("lock poisoned");
            if guard.is_some() {
                return Err(InputError::AlreadyRunning);
            }
            let (tx, rx) = mpsc::channel(64);
            *guard = Some(tx);
            Ok(rx)
        }

        fn stop(&self) {
            *self.sender.lock().expect("lock poisoned") = None;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::MockInputSource;
    use super::*;

    #[tokio::test]
    async fn test_mock_source_delivers_injected_records() {
        let source = MockInputSource::new();
        let mut rx = source.start().expect("start");

        source.inject(InputRecord::Key {
            vk_code: 0x41,
            pressed: true,
        });
        source.inject(InputRecord::Motion { x: 10, y: 20 });

        assert_eq!(
            rx.recv().await,
            Some(InputRecord::Key {
                vk_code: 0x41,
                pressed: true,
            })
        );
        assert_eq!(rx.recv().await, Some(InputRecord::Motion { x: 10, y: 20 }));
    }

    #[tokio::test]
    async fn test_mock_source_stop_closes_channel() {
        let source = MockInputSource::new();
        let mut rx = source.start().expect("start");

        source.stop();

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_mock_source_second_start_fails() {
        let source = MockInputSource::new();
        let _rx = source.start().expect("first start");
        assert!(matches!(source.start(), Err(InputError::AlreadyRunning)));
    }
}
