// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Scripted shell for unit tests.

use super::{redact, Result, Shell, ShellError, Transfer};

use std::{cell::RefCell, collections::VecDeque, path::Path};

/// Replays canned command output, and records every command it sees.
///
/// Transfers always succeed and are recorded as `put <from> <to>` or
/// `get <from> <to>` without consuming a reply. Redacted commands are
/// recorded with their secrets masked.
#[derive(Debug, Default)]
pub(crate) struct ScriptedShell {
    replies: RefCell<VecDeque<Result<String>>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedShell {
    pub(crate) fn new(replies: impl IntoIterator<Item = &'static str>) -> Self {
        Self::with_replies(replies.into_iter().map(|reply| Ok(reply.to_string())))
    }

    pub(crate) fn with_replies(replies: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            commands: RefCell::default(),
        }
    }

    pub(crate) fn failure(stderr: &str) -> Result<String> {
        Err(ShellError::CommandFailed {
            command: String::new(),
            code: Some(1),
            stderr: stderr.to_string(),
        })
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    fn reply(&self, command: String) -> Result<String> {
        self.commands.borrow_mut().push(command.clone());
        self.replies.borrow_mut().pop_front().unwrap_or_else(|| {
            Err(ShellError::CommandFailed {
                command,
                code: Some(127),
                stderr: "unexpected command".into(),
            })
        })
    }
}

impl Shell for ScriptedShell {
    fn run(&self, command: &str, _cwd: Option<&str>) -> Result<String> {
        self.reply(command.to_string())
    }

    fn run_redacted(&self, command: &str, secrets: &[&str], _cwd: Option<&str>) -> Result<String> {
        self.reply(redact(command, secrets))
    }
}

impl Transfer for ScriptedShell {
    fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let record = format!("put {} {remote}", local.display());
        self.commands.borrow_mut().push(record);
        Ok(())
    }

    fn get(&self, remote: &str, local: &Path) -> Result<()> {
        let record = format!("get {remote} {}", local.display());
        self.commands.borrow_mut().push(record);
        Ok(())
    }
}
