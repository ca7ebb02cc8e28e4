//! Input replay capability.
//!
//! The session engine decodes broadcast input packets into [`ClientEvent`]s;
//! a platform collaborator implementing [`InputSink`] injects them into the
//! local desktop. The engine never touches a platform API directly.

use thiserror::Error;

use crate::network::session::ClientEvent;

/// Error type for input replay operations.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input injection failure: {0}")]
    Backend(String),
}

/// Trait abstracting local input injection.
///
/// Production implementations call the OS event-injection API; tests use
/// [`mock::RecordingInputSink`].
pub trait InputSink: Send {
    /// Replays a keyboard press or release.
    fn key_event(&mut self, vk_code: i32, pressed: bool) -> Result<(), InputError>;
    /// Replays a mouse button press or release at an absolute position.
    fn mouse_event(&mut self, x: i32, y: i32, button: i32, pressed: bool)
        -> Result<(), InputError>;
    /// Moves the cursor to an absolute position.
    fn mouse_move(&mut self, x: i32, y: i32) -> Result<(), InputError>;
}

/// Routes an event to the sink if it is an input event.
///
/// Returns `true` when the event was consumed, `false` when it is not an
/// input event and the caller should handle it.
pub fn replay_event(sink: &mut dyn InputSink, event: &ClientEvent) -> Result<bool, InputError> {
    match *event {
        ClientEvent::KeyEvent { vk_code, pressed } => {
            sink.key_event(vk_code, pressed)?;
            Ok(true)
        }
        ClientEvent::MouseEvent {
            x,
            y,
            button,
            pressed,
        } => {
            sink.mouse_event(x, y, button, pressed)?;
            Ok(true)
        }
        ClientEvent::MouseMove { x, y } => {
            sink.mouse_move(x, y)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub mod mock {
    //! Recording sink for unit testing.

    use super::{InputError, InputSink};

    /// One replayed event, as recorded by [`RecordingInputSink`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Replayed {
        Key { vk_code: i32, pressed: bool },
        Button { x: i32, y: i32, button: i32, pressed: bool },
        Motion { x: i32, y: i32 },
    }

    /// An [`InputSink`] that records everything it is asked to replay.
    #[derive(Debug, Default)]
    pub struct RecordingInputSink {
        pub replayed: Vec<Replayed>,
    }

    impl RecordingInputSink {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl InputSink for RecordingInputSink {
        fn key_event(&mut self, vk_code: i32, pressed: bool) -> Result<(), InputError> {
            self.replayed.push(Replayed::Key { vk_code, pressed });
            Ok(())
        }

        fn mouse_event(
            &mut self,
            x: i32,
            y: i32,
            button: i32,
            pressed: bool,
        ) -> Result<(), InputError> {
            self.replayed.push(Replayed::Button {
                x,
                y,
                button,
                pressed,
            });
            Ok(())
        }

        fn mouse_move(&mut self, x: i32, y: i32) -> Result<(), InputError> {
            self.replayed.push(Replayed::Motion { x, y });
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::{RecordingInputSink, Replayed};
    use super::*;

    #[test]
    fn test_replay_routes_input_events_in_order() {
        let mut sink = RecordingInputSink::new();

        let events = [
            ClientEvent::KeyEvent {
                vk_code: 0x41,
                pressed: true,
            },
            ClientEvent::MouseMove { x: 100, y: 200 },
            ClientEvent::MouseEvent {
                x: 100,
                y: 200,
                button: 1,
                pressed: true,
            },
        ];
        for event in &events {
            assert!(replay_event(&mut sink, event).expect("replay"));
        }

        assert_eq!(
            sink.replayed,
            vec![
                Replayed::Key {
                    vk_code: 0x41,
                    pressed: true,
                },
                Replayed::Motion { x: 100, y: 200 },
                Replayed::Button {
                    x: 100,
                    y: 200,
                    button: 1,
                    pressed: true,
                },
            ]
        );
    }

    #[test]
    fn test_non_input_events_are_not_consumed() {
        let mut sink = RecordingInputSink::new();
        let event = ClientEvent::ClipboardRequested;

        assert!(!replay_event(&mut sink, &event).expect("replay"));
        assert!(sink.replayed.is_empty());
    }
}
