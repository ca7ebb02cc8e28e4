//! Command execution capability.
//!
//! The server can ask a client to run a command. The engine hands the
//! request to a [`CommandExecutor`]; the collaborator reports the captured
//! output asynchronously, and the caller relays it back with
//! `send_command_output`. Failures are reported as output text, never as
//! crashes.

use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

/// How a command string should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Run through the platform shell (`sh -c` / `cmd /C`).
    Shell,
    /// First whitespace token is the program, the rest are arguments.
    Program,
}

impl CommandKind {
    /// Maps the wire `command_type` string. Unknown values fall back to
    /// [`CommandKind::Shell`].
    pub fn from_wire(command_type: &str) -> Self {
        match command_type {
            "program" => CommandKind::Program,
            _ => CommandKind::Shell,
        }
    }
}

/// Trait abstracting command execution.
///
/// `execute` returns immediately; the output (stdout and stderr combined,
/// or an error description) arrives on the returned channel when the
/// command finishes.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: String, kind: CommandKind) -> oneshot::Receiver<String>;
}

/// Executes commands through [`tokio::process::Command`].
#[derive(Debug, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command: String, kind: CommandKind) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            debug!("executing {kind:?} command: {command:?}");
            let text = run_command(&command, kind).await;
            // Receiver dropped means the session ended; nothing to relay.
            let _ = tx.send(text);
        });
        rx
    }
}

async fn run_command(command: &str, kind: CommandKind) -> String {
    let output = match kind {
        CommandKind::Shell => shell_command(command).output().await,
        CommandKind::Program => {
            let mut parts = command.split_whitespace();
            let Some(program) = parts.next() else {
                return "error: empty command".to_string();
            };
            Command::new(program).args(parts).output().await
        }
    };

    match output {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            if !output.stderr.is_empty() {
                text.push_str(&String::from_utf8_lossy(&output.stderr));
            }
            text
        }
        Err(e) => format!("error: failed to run {command:?}: {e}"),
    }
}

#[cfg(target_os = "windows")]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

pub mod mock {
    //! Scripted executor for unit testing.

    use std::sync::{Arc, Mutex};

    use tokio::sync::oneshot;

    use super::{CommandExecutor, CommandKind};

    /// A [`CommandExecutor`] that replies with a fixed output and records
    /// every request.
    pub struct ScriptedExecutor {
        reply: String,
        pub requests: Arc<Mutex<Vec<(String, CommandKind)>>>,
    }

    impl ScriptedExecutor {
        pub fn new(reply: impl Into<String>) -> Self {
            Self {
                reply: reply.into(),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl CommandExecutor for ScriptedExecutor {
        fn execute(&self, command: String, kind: CommandKind) -> oneshot::Receiver<String> {
            self.requests
                .lock()
                .expect("lock poisoned")
                .push((command, kind));
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(self.reply.clone());
            rx
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
