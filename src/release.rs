// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release directory management.
//!
//! A __release__ is one deployed snapshot of the application, unpacked into
//! its own directory under the remote base directory. Releases are named
//! `www-<timestamp>`, where the timestamp uses the fixed-width format
//! `YY-MM-DD_HH.MM.SS`. They are created by deployment, never mutated, and
//! never cleaned up automatically.
//!
//! # Base Directory Layout
//!
//! ```text
//! /srv/app
//! ├── www -> www-20-06-01_10.00.00
//! ├── www-20-04-01_10.00.00/
//! ├── www-20-05-01_10.00.00/
//! └── www-20-06-01_10.00.00/
//! ```
//!
//! The `www` symlink is the __current link__. Whatever it points at is the
//! release being served. Exactly one release may be current, and the target
//! must name an existing release, otherwise the layout is considered broken
//! and nothing is allowed to touch it.
//!
//! # Ordering
//!
//! Releases are ordered by plain string comparison of their names. Because
//! the timestamp is fixed-width and most significant field first, string
//! order is chronological order. The timestamp is never parsed into a date
//! type: if the format ever changes, this invariant must be re-checked.
//!
//! # See Also
//!
//! 1. [`rollback`] for the two-phase rollback protocol.

pub mod rollback;

use crate::shell::{quote, Shell, ShellError};

use chrono::Local;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::{debug, info, instrument};

/// Name prefix shared by all release directories.
pub const RELEASE_PREFIX: &str = "www-";

/// Name of the current link inside the base directory.
pub const CURRENT_LINK: &str = "www";

/// Format of the timestamp portion of a release name.
pub const TIMESTAMP_FORMAT: &str = "%y-%m-%d_%H.%M.%S";

/// Name of a single release directory.
///
/// # Invariant
///
/// - Name always starts with [`RELEASE_PREFIX`] followed by a non-empty
///   timestamp.
/// - Ordering is lexicographic on the full name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Release(String);

impl Release {
    /// Construct release from timestamp portion.
    ///
    /// # Errors
    ///
    /// - Return [`ReleaseError::InvalidName`] if timestamp is empty or
    ///   contains a slash.
    pub fn from_timestamp(timestamp: impl AsRef<str>) -> Result<Self> {
        format!("{RELEASE_PREFIX}{}", timestamp.as_ref()).parse()
    }

    /// Construct release stamped with the current local time.
    pub fn now() -> Self {
        // INVARIANT: Formatted timestamp is never empty and holds no slash.
        Self(format!(
            "{RELEASE_PREFIX}{}",
            Local::now().format(TIMESTAMP_FORMAT)
        ))
    }

    /// Full directory name.
    pub fn name(&self) -> &str {
        self.0.as_str()
    }

    /// Timestamp portion of directory name.
    pub fn timestamp(&self) -> &str {
        &self.0[RELEASE_PREFIX.len()..]
    }
}

impl FromStr for Release {
    type Err = ReleaseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.strip_prefix(RELEASE_PREFIX) {
            Some(timestamp) if !timestamp.is_empty() && !timestamp.contains('/') => {
                Ok(Self(name.to_string()))
            }
            _ => Err(ReleaseError::InvalidName(name.to_string())),
        }
    }
}

impl Display for Release {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

impl AsRef<str> for Release {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

/// Release directory manager.
///
/// Reads release state through a [`Shell`] scoped to the base directory.
/// Holds no state of its own between calls: every query re-reads the
/// directory listing and the current link.
#[derive(Debug, Clone)]
pub struct ReleaseDirectory<S>
where
    S: Shell,
{
    shell: S,
    base_dir: String,
    owner: Option<String>,
}

impl<S> ReleaseDirectory<S>
where
    S: Shell,
{
    /// Construct new release directory manager.
    ///
    /// If `owner` is given, it is applied to the current link after every
    /// swap, e.g., `www-data:www-data`.
    pub fn new(shell: S, base_dir: impl Into<String>, owner: Option<String>) -> Self {
        Self {
            shell,
            base_dir: base_dir.into(),
            owner,
        }
    }

    /// Base directory housing all releases.
    pub fn base_dir(&self) -> &str {
        self.base_dir.as_str()
    }

    /// Ownership applied to the current link after swaps.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// List all releases, newest first.
    ///
    /// An empty listing is valid.
    ///
    /// # Errors
    ///
    /// - Return [`ReleaseError::Shell`] if the listing command fails.
    #[instrument(skip(self), level = "debug")]
    pub fn list_releases(&self) -> Result<Vec<Release>> {
        let listing = self.shell.run("ls -p -1", Some(self.base_dir()))?;
        let releases = parse_listing(&listing);
        debug!("found {} releases in {}", releases.len(), self.base_dir());
        Ok(releases)
    }

    /// Determine release the current link points at.
    ///
    /// # Errors
    ///
    /// - Return [`ReleaseError::NotASymlink`] if current link is not a
    ///   symbolic link.
    /// - Return [`ReleaseError::UnknownRelease`] if current link points at
    ///   something that is not a listed release, or leaves the base
    ///   directory.
    /// - Return [`ReleaseError::Shell`] if a command fails.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve_current(&self) -> Result<Release> {
        let releases = self.list_releases()?;
        self.resolve_current_in(&releases)
    }

    pub(crate) fn resolve_current_in(&self, releases: &[Release]) -> Result<Release> {
        // INVARIANT: A missing link reads as empty output, not a failure.
        let output = self.shell.run(
            &format!("ls -ld {CURRENT_LINK} 2>/dev/null || true"),
            Some(self.base_dir()),
        )?;
        let target = parse_link_target(&output)?;
        info!("found current symbol link points to: {target}");

        // INVARIANT: Target must name a listed release inside base directory.
        let current = link_release_name(&target, self.base_dir())
            .and_then(|name| releases.iter().find(|release| release.name() == name))
            .cloned();

        current.ok_or(ReleaseError::UnknownRelease(target))
    }

    /// Point current link at target release.
    ///
    /// The new link is created under a temporary name and renamed over the
    /// current link, so readers never observe a missing link. Ownership is
    /// restored afterwards if configured.
    ///
    /// # Errors
    ///
    /// - Return [`ReleaseError::Shell`] if a command fails.
    #[instrument(skip(self), level = "debug")]
    pub fn apply_rollback(&self, target: &Release) -> Result<()> {
        self.point_current_at(target)
    }

    pub(crate) fn point_current_at(&self, target: &Release) -> Result<()> {
        let staging = format!("{CURRENT_LINK}.next");
        info!("point {CURRENT_LINK} at {target}");
        self.shell.run(
            &format!(
                "ln -sfn {} {staging} && mv -Tf {staging} {CURRENT_LINK}",
                quote(target.name())
            ),
            Some(self.base_dir()),
        )?;

        if let Some(owner) = self.owner() {
            self.shell.run(
                &format!("chown -h {} {CURRENT_LINK}", quote(owner)),
                Some(self.base_dir()),
            )?;
        }

        Ok(())
    }
}

/// Compute release to roll back to.
///
/// Rollback is a single-step undo: the target is always the release
/// immediately older than `current`, never an arbitrary older one.
///
/// # Errors
///
/// - Return [`ReleaseError::UnknownRelease`] if `current` is not listed.
/// - Return [`ReleaseError::NoOlderVersion`] if `current` is the oldest
///   release.
pub fn compute_rollback_target(releases: &[Release], current: &Release) -> Result<Release> {
    let index = releases
        .iter()
        .position(|release| release == current)
        .ok_or_else(|| ReleaseError::UnknownRelease(current.to_string()))?;

    releases
        .get(index + 1)
        .cloned()
        .ok_or_else(|| ReleaseError::NoOlderVersion(current.clone()))
}

/// Parse `ls -p -1` output into releases, newest first.
///
/// Only directories, marked by a trailing slash, whose names start with
/// [`RELEASE_PREFIX`] are kept. Tolerates both LF and CRLF line endings.
pub fn parse_listing(listing: &str) -> Vec<Release> {
    let mut releases = listing
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_suffix('/'))
        .filter_map(|name| name.parse::<Release>().ok())
        .collect::<Vec<_>>();

    // INVARIANT: Newest first.
    releases.sort_by(|a, b| b.cmp(a));
    releases
}

/// Parse `ls -ld` output of the current link into its target path.
///
/// Trailing slashes are dropped, anything else is returned as written in
/// the link.
///
/// # Errors
///
/// - Return [`ReleaseError::NotASymlink`] if output does not describe a
///   symbolic link with exactly one target.
pub fn parse_link_target(output: &str) -> Result<String> {
    let line = output.trim_end_matches(['\r', '\n']);
    let parts = line.split(" -> ").collect::<Vec<_>>();
    if parts.len() != 2 {
        return Err(ReleaseError::NotASymlink {
            output: line.to_string(),
        });
    }

    let target = parts[1].trim().trim_end_matches('/');
    if target.is_empty() {
        return Err(ReleaseError::NotASymlink {
            output: line.to_string(),
        });
    }

    Ok(target.to_string())
}

/// Name of the release a link target refers to inside `base_dir`.
///
/// Accepts a bare entry name, optionally prefixed with `./`, or an absolute
/// path whose parent is exactly `base_dir`. Returns `None` for targets that
/// leave the base directory.
pub fn link_release_name<'a>(target: &'a str, base_dir: &str) -> Option<&'a str> {
    let target = target.strip_prefix("./").unwrap_or(target);
    let name = match target.rsplit_once('/') {
        None => target,
        Some((parent, name)) if parent == base_dir.trim_end_matches('/') => name,
        Some(_) => return None,
    };

    (!name.is_empty() && name != "." && name != "..").then_some(name)
}

/// Release management error types.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// Current link is not a symbolic link.
    #[error("'{CURRENT_LINK}' is not a symbol link: {output:?}")]
    NotASymlink { output: String },

    /// Current link points at a release that does not exist.
    #[error("symbol link is invalid: {0:?} is not a known release")]
    UnknownRelease(String),

    /// Current release is already the oldest one.
    #[error("already the oldest version: {0}")]
    NoOlderVersion(Release),

    /// Base directory contains no releases at all.
    #[error("no releases found in {0:?}")]
    NoReleases(String),

    /// Name does not follow release naming scheme.
    #[error("invalid release name {0:?}")]
    InvalidName(String),

    /// Shell collaborator failed.
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Friendly result alias :3
pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;
