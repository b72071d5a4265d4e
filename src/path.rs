// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the deployment definition lives when the operator does
//! not name one explicitly.

use std::path::{Path, PathBuf};

/// File name of the deployment definition.
pub const DEFINITION_FILE: &str = "releasectl.toml";

/// Determine default absolute path to user level deployment definition.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/releasectl/releasectl.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_definition_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("releasectl").join(DEFINITION_FILE))
        .ok_or(NoWayHome)
}

/// Locate deployment definition for a project directory.
///
/// Prefers `releasectl.toml` inside the project directory, and falls back
/// to [`default_definition_path`].
///
/// # Errors
///
/// - Return [`NoWayHome`] if fallback path cannot be determined.
pub fn locate_definition(project_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let local = project_dir.as_ref().join(DEFINITION_FILE);
    if local.is_file() {
        return Ok(local);
    }

    default_definition_path()
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
