//! Overseer spawning with `tokio::process`.

use std::io::Write;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use phd_core::{Invocation, SpawnOutput, Spawner};

use crate::error::PlatformError;

/// Spawns overseers as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSpawner;

impl CommandSpawner {
    /// Creates a spawner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn command(invocation: &Invocation) -> Command {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args).current_dir(&invocation.cwd);
    cmd
}

fn spawn_error(invocation: &Invocation, e: &std::io::Error) -> PlatformError {
    PlatformError::spawn(format!(
        "'{invocation}' in '{}': {e}",
        invocation.cwd.display()
    ))
}

/// Exit code, with death by signal mapped to the shell convention `128 + signo`.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signo) = status.signal() {
            return 128 + signo;
        }
    }
    status.code().unwrap_or(1)
}

#[async_trait]
impl Spawner for CommandSpawner {
    fn effective_user(&self) -> phd_core::Result<String> {
        #[cfg(unix)]
        {
            use nix::unistd::{User, geteuid};

            let uid = geteuid();
            let user = User::from_uid(uid)
                .map_err(|e| PlatformError::UnknownUser(format!("uid {uid}: {e}")))?
                .ok_or_else(|| PlatformError::UnknownUser(format!("uid {uid}")))?;
            Ok(user.name)
        }

        #[cfg(not(unix))]
        {
            Err(PlatformError::not_supported("user lookup not supported on this platform").into())
        }
    }

    async fn run_detached(
        &self,
        invocation: &Invocation,
        payload: &[u8],
    ) -> phd_core::Result<SpawnOutput> {
        let mut child = command(invocation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(invocation, &e))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(payload).await {
                Ok(()) => {}
                // The child exited before reading; its status tells the story.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(spawn_error(invocation, &e).into()),
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| spawn_error(invocation, &e))?;
        tracing::debug!(
            command = %invocation,
            status = %output.status,
            "launcher exited"
        );

        Ok(SpawnOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_foreground(&self, invocation: &Invocation, payload: &[u8]) -> phd_core::Result<i32> {
        // The payload goes through a file so the child keeps the terminal for output.
        let mut config_file = tempfile::NamedTempFile::new().map_err(PlatformError::Io)?;
        config_file.write_all(payload).map_err(PlatformError::Io)?;
        config_file.flush().map_err(PlatformError::Io)?;
        let stdin = config_file.reopen().map_err(PlatformError::Io)?;

        // Installed before the child exists: an operator's ^C must only reach
        // the child. Ignoring SIGINT outright would be inherited across exec.
        #[cfg(unix)]
        let mut interrupts = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .map_err(PlatformError::Io)?;

        let mut child = command(invocation)
            .stdin(Stdio::from(stdin))
            .spawn()
            .map_err(|e| spawn_error(invocation, &e))?;

        #[cfg(unix)]
        let status = loop {
            tokio::select! {
                status = child.wait() => break status.map_err(|e| spawn_error(invocation, &e))?,
                Some(()) = interrupts.recv() => {
                    tracing::debug!("interrupt left to the foreground overseer");
                }
            }
        };

        #[cfg(not(unix))]
        let status = child.wait().await.map_err(|e| spawn_error(invocation, &e))?;

        Ok(exit_code(status))
    }
}
