use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors from running a command on a remote host.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to start ssh for {host}: {source}")]
    Spawn { host: String, source: io::Error },
    #[error("command on {host} exited with {status}: {stderr}")]
    Failed {
        host: String,
        status: String,
        stderr: String,
    },
}

/// Runs one shell command on a remote host and reports success.
pub trait RemoteExecutor {
    fn run(&self, credential: &Path, host: &str, command: &str) -> Result<(), RemoteError>;
}

/// [`RemoteExecutor`] backed by the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    user: String,
    program: PathBuf,
}

impl SshExecutor {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            program: PathBuf::from("ssh"),
        }
    }

    /// Use a different client binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, credential: &Path, host: &str, command: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            credential.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            format!("{}@{}", self.user, host),
            command.to_string(),
        ]
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(&self, credential: &Path, host: &str, command: &str) -> Result<(), RemoteError> {
        let output = Command::new(&self.program)
            .args(self.args(credential, host, command))
            .output()
            .map_err(|source| RemoteError::Spawn {
                host: host.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(RemoteError::Failed {
                host: host.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
