// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Two-phase rollback protocol.
//!
//! Rolling back is split into a read-only planning phase and a mutating
//! apply phase. The plan lists every release, marks the current one, and
//! names the release that would become current. Only a plan that the
//! operator explicitly approved can be applied.
//!
//! There is no recovery from partial completion. If the process dies after
//! the link swap but before services restart, the served code and the
//! running process disagree until the operator restarts services by hand.

use crate::{
    release::{compute_rollback_target, Release, ReleaseDirectory, ReleaseError, Result},
    shell::Shell,
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument};

const BANNER_RULE: &str = "==================================================";

/// Read-only description of a pending rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackPlan {
    releases: Vec<Release>,
    current: Release,
    target: Release,
}

impl RollbackPlan {
    /// All releases at planning time, newest first.
    pub fn releases(&self) -> &[Release] {
        self.releases.as_slice()
    }

    /// Release currently served.
    pub fn current(&self) -> &Release {
        &self.current
    }

    /// Release that becomes current once applied.
    pub fn target(&self) -> &Release {
        &self.target
    }
}

impl Display for RollbackPlan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "{BANNER_RULE}")?;
        for release in &self.releases {
            if release == &self.current {
                writeln!(fmt, "      Current ---> {release}")?;
            } else if release == &self.target {
                writeln!(fmt, "  Rollback to ---> {release}")?;
            } else {
                writeln!(fmt, "                   {release}")?;
            }
        }
        writeln!(fmt, "{BANNER_RULE}")
    }
}

/// Operator's answer to a rollback plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Approved,
    Declined,
}

impl From<bool> for Confirmation {
    fn from(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Declined
        }
    }
}

/// Result of applying a rollback plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Current link now points at `to`.
    Applied { from: Release, to: Release },

    /// Operator declined, nothing changed.
    Cancelled,
}

impl<S> ReleaseDirectory<S>
where
    S: Shell,
{
    /// Plan rollback to the release preceding the current one.
    ///
    /// # Errors
    ///
    /// - Return [`ReleaseError::NoReleases`] if no releases exist.
    /// - Return [`ReleaseError::NotASymlink`] if current link is broken.
    /// - Return [`ReleaseError::UnknownRelease`] if current link is stale.
    /// - Return [`ReleaseError::NoOlderVersion`] if nothing older exists.
    #[instrument(skip(self), level = "debug")]
    pub fn plan_rollback(&self) -> Result<RollbackPlan> {
        let releases = self.list_releases()?;
        if releases.is_empty() {
            return Err(ReleaseError::NoReleases(self.base_dir().to_string()));
        }

        let current = self.resolve_current_in(&releases)?;
        let target = compute_rollback_target(&releases, &current)?;

        Ok(RollbackPlan {
            releases,
            current,
            target,
        })
    }

    /// Apply rollback plan if the operator approved it.
    ///
    /// # Errors
    ///
    /// - Return [`ReleaseError::Shell`] if swapping the current link fails.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn confirm_and_apply(
        &self,
        plan: RollbackPlan,
        confirmation: Confirmation,
    ) -> Result<RollbackOutcome> {
        if confirmation == Confirmation::Declined {
            info!("rollback cancelled");
            return Ok(RollbackOutcome::Cancelled);
        }

        info!("start rollback from {} to {}", plan.current, plan.target);
        self.apply_rollback(&plan.target)?;

        Ok(RollbackOutcome::Applied {
            from: plan.current,
            to: plan.target,
        })
    }
}
