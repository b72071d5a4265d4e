// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shell command collaborators.
//!
//! Every task in releasectl boils down to a sequence of shell commands, some
//! executed on the operator's machine, and some executed on the remote host
//! that serves the application. This module provides the seam between the
//! release logic and the processes that actually do the work.
//!
//! # Warn-Only Mode
//!
//! Most commands are fatal on failure. Service restarts are the exception:
//! they run in __warn-only__ mode, where a non-zero exit status is logged and
//! then ignored, because a stopped service that refuses to stop again should
//! not keep the new release from starting.
//!
//! # Secrets
//!
//! Commands that carry credentials go through [`Shell::run_redacted`]. The
//! secrets are masked as [`REDACTED`] wherever the command text is logged
//! or reported in a [`ShellError`].

#[cfg(test)]
pub(crate) mod scripted;

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, Output},
};
use tracing::{debug, warn};

/// Replacement text for secrets in logged commands.
pub const REDACTED: &str = "***";

/// Execute shell command strings somewhere.
pub trait Shell {
    /// Run command, optionally scoped to a working directory.
    ///
    /// Returns standard output with its trailing newline chomped.
    ///
    /// # Errors
    ///
    /// - Return [`ShellError::Spawn`] if the process cannot be started.
    /// - Return [`ShellError::CommandFailed`] if the command exits non-zero.
    fn run(&self, command: &str, cwd: Option<&str>) -> Result<String>;

    /// Run command whose text carries secrets.
    ///
    /// Behaves like [`Shell::run`], but every secret is masked in logs and
    /// errors.
    ///
    /// # Errors
    ///
    /// - Return [`ShellError`] like [`Shell::run`], with secrets masked.
    fn run_redacted(&self, command: &str, secrets: &[&str], cwd: Option<&str>) -> Result<String> {
        self.run(command, cwd).map_err(|error| error.redact(secrets))
    }

    /// Run command in warn-only mode.
    ///
    /// Failures are logged and swallowed. Returns `None` if the command
    /// failed.
    fn run_warn_only(&self, command: &str, cwd: Option<&str>) -> Option<String> {
        match self.run(command, cwd) {
            Ok(output) => Some(output),
            Err(error) => {
                warn!("{error}");
                None
            }
        }
    }
}

impl<S> Shell for &S
where
    S: Shell + ?Sized,
{
    fn run(&self, command: &str, cwd: Option<&str>) -> Result<String> {
        (**self).run(command, cwd)
    }

    fn run_redacted(&self, command: &str, secrets: &[&str], cwd: Option<&str>) -> Result<String> {
        (**self).run_redacted(command, secrets, cwd)
    }
}

/// Copy files between the operator's machine and a remote host.
pub trait Transfer {
    /// Upload local file to remote path.
    fn put(&self, local: &Path, remote: &str) -> Result<()>;

    /// Download remote file into local path.
    fn get(&self, remote: &str, local: &Path) -> Result<()>;
}

impl<T> Transfer for &T
where
    T: Transfer + ?Sized,
{
    fn put(&self, local: &Path, remote: &str) -> Result<()> {
        (**self).put(local, remote)
    }

    fn get(&self, remote: &str, local: &Path) -> Result<()> {
        (**self).get(remote, local)
    }
}

/// Run commands on the operator's machine through `sh -c`.
#[derive(Debug, Default, Clone)]
pub struct LocalShell;

impl LocalShell {
    pub fn new() -> Self {
        Self
    }

    fn exec(&self, command: &str, shown: &str, cwd: Option<&str>) -> Result<String> {
        debug!("local: {shown}");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        finish(shown, cmd.output())
    }
}

impl Shell for LocalShell {
    fn run(&self, command: &str, cwd: Option<&str>) -> Result<String> {
        self.exec(command, command, cwd)
    }

    fn run_redacted(&self, command: &str, secrets: &[&str], cwd: Option<&str>) -> Result<String> {
        self.exec(command, &redact(command, secrets), cwd)
            .map_err(|error| error.redact(secrets))
    }
}

impl Transfer for LocalShell {
    fn put(&self, local: &Path, remote: &str) -> Result<()> {
        copy_into(local, Path::new(remote))
    }

    fn get(&self, remote: &str, local: &Path) -> Result<()> {
        copy_into(Path::new(remote), local)
    }
}

// INVARIANT: Copying into a directory keeps the file name, like scp.
fn copy_into(from: &Path, to: &Path) -> Result<()> {
    let to = match (to.is_dir(), from.file_name()) {
        (true, Some(name)) => to.join(name),
        _ => to.to_path_buf(),
    };
    debug!("local: copy {} -> {}", from.display(), to.display());
    std::fs::copy(from, &to).map_err(|source| ShellError::Copy {
        source,
        from: from.to_path_buf(),
        to,
    })?;

    Ok(())
}

/// Run commands on a remote host through `ssh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshShell {
    destination: String,
    port: Option<u16>,
}

impl SshShell {
    /// Construct new remote shell for `user@host`.
    pub fn new(user: impl AsRef<str>, host: impl AsRef<str>, port: Option<u16>) -> Self {
        let destination = if user.as_ref().is_empty() {
            host.as_ref().to_string()
        } else {
            format!("{}@{}", user.as_ref(), host.as_ref())
        };

        Self { destination, port }
    }

    /// SSH destination in `user@host` form.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn ssh_args(&self, command: &str, cwd: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(self.destination.clone());
        args.push(scoped(command, cwd));
        args
    }

    fn scp_args(&self, from: impl Into<String>, to: impl Into<String>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.port {
            // INVARIANT: scp spells the port flag in upper case.
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args.push(from.into());
        args.push(to.into());
        args
    }

    fn remote_location(&self, path: &str) -> String {
        format!("{}:{}", self.destination, path)
    }

    fn exec(&self, command: &str, shown: &str, cwd: Option<&str>) -> Result<String> {
        debug!("[{}] run: {}", self.destination, scoped(shown, cwd));
        let output = Command::new("ssh").args(self.ssh_args(command, cwd)).output();
        finish(shown, output)
    }
}

impl Shell for SshShell {
    fn run(&self, command: &str, cwd: Option<&str>) -> Result<String> {
        self.exec(command, command, cwd)
    }

    fn run_redacted(&self, command: &str, secrets: &[&str], cwd: Option<&str>) -> Result<String> {
        self.exec(command, &redact(command, secrets), cwd)
            .map_err(|error| error.redact(secrets))
    }
}

impl Transfer for SshShell {
    fn put(&self, local: &Path, remote: &str) -> Result<()> {
        debug!("[{}] put: {} -> {remote}", self.destination, local.display());
        let args = self.scp_args(local.to_string_lossy(), self.remote_location(remote));
        syscall("scp", args)?;
        Ok(())
    }

    fn get(&self, remote: &str, local: &Path) -> Result<()> {
        debug!("[{}] get: {remote} -> {}", self.destination, local.display());
        let args = self.scp_args(self.remote_location(remote), local.to_string_lossy());
        syscall("scp", args)?;
        Ok(())
    }
}

/// Quote string for safe interpolation into a POSIX shell command.
pub fn quote(arg: impl AsRef<str>) -> String {
    format!("'{}'", arg.as_ref().replace('\'', "'\\''"))
}

/// Mask secrets in command text.
///
/// Both the raw secret and its [`quote`] escaped form are masked. Empty
/// secrets are ignored.
pub fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_string(), |text, secret| {
            text.replace(secret, REDACTED)
                .replace(&secret.replace('\'', "'\\''"), REDACTED)
        })
}

/// Prefix command with a directory change if needed.
pub fn scoped(command: &str, cwd: Option<&str>) -> String {
    match cwd {
        Some(dir) => format!("cd {} && {command}", quote(dir)),
        None => command.to_string(),
    }
}

fn syscall(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let label = cmd.as_ref().to_string_lossy().into_owned();
    let output = Command::new(cmd.as_ref()).args(args).output();
    finish(&label, output)
}

fn finish(command: &str, output: std::io::Result<Output>) -> Result<String> {
    let output = output.map_err(|source| ShellError::Spawn {
        source,
        command: command.to_string(),
    })?;
    let stdout = chomp(String::from_utf8_lossy(output.stdout.as_slice()).into_owned());
    let stderr = chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned());

    if !output.status.success() {
        return Err(ShellError::CommandFailed {
            command: command.to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    Ok(stdout)
}

// INVARIANT: Chomp one trailing newline, CRLF or LF.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// Join remote path components with forward slashes.
pub fn remote_join(base: &str, name: &str) -> String {
    format!("{}/{name}", base.trim_end_matches('/'))
}

/// Shell command error types.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Process could not be started.
    #[error("failed to spawn {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Process exited with non-zero status.
    #[error("command {command:?} failed ({}):\n{stderr}", .code.map_or("signal".to_string(), |c| format!("exit {c}")))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Local file copy failed.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

impl ShellError {
    /// Mask secrets in the reported command and its error output.
    pub fn redact(self, secrets: &[&str]) -> Self {
        match self {
            Self::Spawn { source, command } => Self::Spawn {
                source,
                command: redact(&command, secrets),
            },
            Self::CommandFailed {
                command,
                code,
                stderr,
            } => Self::CommandFailed {
                command: redact(&command, secrets),
                code,
                stderr: redact(&stderr, secrets),
            },
            other => other,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ShellError> = std::result::Result<T, E>;
