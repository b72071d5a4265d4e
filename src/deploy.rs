// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment tasks.
//!
//! Package the application into an archive, ship it to the remote host as a
//! brand new release, move the current link onto it, and restart services.
//! Each task is a thin sequence of shell commands driven through the
//! [`Shell`] and [`Transfer`] collaborators.

use crate::{
    config::DeployDefinition,
    release::{
        rollback::{Confirmation, RollbackOutcome, RollbackPlan},
        Release, ReleaseDirectory, ReleaseError,
    },
    shell::{quote, remote_join, Shell, ShellError, Transfer},
};

use std::{
    fs::remove_file,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Drive deployment tasks for one deployment definition.
///
/// `R` reaches the server hosting the releases, and `L` reaches the
/// operator's machine.
#[derive(Debug)]
pub struct Deployer<R, L>
where
    R: Shell + Transfer,
    L: Shell,
{
    pub(crate) definition: DeployDefinition,
    pub(crate) remote: R,
    pub(crate) local: L,
    pub(crate) project_dir: PathBuf,
}

impl<R, L> Deployer<R, L>
where
    R: Shell + Transfer,
    L: Shell,
{
    /// Construct new deployer.
    pub fn new(
        definition: DeployDefinition,
        remote: R,
        local: L,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            definition,
            remote,
            local,
            project_dir: project_dir.into(),
        }
    }

    /// Deployment definition in use.
    pub fn definition(&self) -> &DeployDefinition {
        &self.definition
    }

    /// Release directory manager for the remote base directory.
    pub fn releases(&self) -> ReleaseDirectory<&R> {
        ReleaseDirectory::new(
            &self.remote,
            self.definition.remote.base_dir.as_str(),
            self.definition.remote.owner.clone(),
        )
    }

    /// Local path of the application archive.
    pub fn archive_path(&self) -> PathBuf {
        self.project_dir.join(self.definition.package.archive_path())
    }

    /// Package application into archive.
    ///
    /// Include patterns are expanded relative to the project directory.
    /// Patterns that match nothing are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Pattern`] if an include pattern is malformed.
    /// - Return [`DeployError::NothingToPackage`] if no include matched.
    /// - Return [`DeployError::Io`] if the old archive cannot be removed.
    /// - Return [`DeployError::Shell`] if tar fails.
    #[instrument(skip(self), level = "debug")]
    pub fn build(&self) -> Result<PathBuf> {
        let archive = self.archive_path();
        info!("build archive {}", archive.display());

        if let Some(parent) = archive.parent() {
            mkdirp::mkdirp(parent).map_err(|source| DeployError::Io {
                source,
                path: parent.to_path_buf(),
            })?;
        }

        if archive.exists() {
            remove_file(&archive).map_err(|source| DeployError::Io {
                source,
                path: archive.clone(),
            })?;
        }

        let includes = self.expand_includes()?;
        if includes.is_empty() {
            return Err(DeployError::NothingToPackage);
        }

        let mut cmd = vec![
            "tar".to_string(),
            "--dereference".into(),
            "-czvf".into(),
            quote(path_str(&archive)),
        ];
        cmd.extend(
            self.definition
                .package
                .exclude
                .iter()
                .map(|pattern| format!("--exclude={}", quote(pattern))),
        );
        cmd.extend(includes.iter().map(quote));

        self.local
            .run(&cmd.join(" "), Some(path_str(&self.project_dir).as_str()))?;

        Ok(archive)
    }

    fn expand_includes(&self) -> Result<Vec<String>> {
        let root = glob::Pattern::escape(path_str(&self.project_dir).as_str());
        let mut includes = Vec::new();
        for pattern in &self.definition.package.include {
            let full = format!("{}/{pattern}", root.trim_end_matches('/'));
            let mut matched = false;
            for entry in glob::glob(&full)?.flatten() {
                // INVARIANT: Keep archive paths relative to project directory.
                if let Ok(relative) = entry.strip_prefix(&self.project_dir) {
                    includes.push(relative.to_string_lossy().into_owned());
                    matched = true;
                }
            }

            if !matched {
                warn!("include pattern {pattern:?} matched nothing");
            }
        }

        includes.sort();
        includes.dedup();
        Ok(includes)
    }

    /// Ship archive to remote host as a new release stamped now.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::MissingArchive`] if no archive was built.
    /// - Return [`DeployError::Shell`] if any remote step fails.
    pub fn ship(&self) -> Result<Release> {
        self.ship_as(Release::now())
    }

    /// Ship archive to remote host as given release.
    ///
    /// Uploads the archive, unpacks it into a fresh release directory, hands
    /// ownership over, points the current link at it, and restarts services
    /// in warn-only mode.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::MissingArchive`] if no archive was built.
    /// - Return [`DeployError::Shell`] if any remote step fails.
    #[instrument(skip(self), level = "debug")]
    pub fn ship_as(&self, release: Release) -> Result<Release> {
        let archive = self.archive_path();
        if !archive.is_file() {
            return Err(DeployError::MissingArchive(archive));
        }

        let settings = &self.definition.remote;
        let base_dir = settings.base_dir.as_str();
        let remote_tar = remote_join(&settings.tmp_dir, &self.definition.package.archive);
        let release_dir = remote_join(base_dir, release.name());

        info!("ship {} as {release}", archive.display());
        self.remote.run(&format!("rm -f {}", quote(&remote_tar)), None)?;
        self.remote.put(&archive, &remote_tar)?;
        self.remote
            .run(&format!("mkdir {}", quote(release.name())), Some(base_dir))?;
        self.remote
            .run(&format!("tar -xzvf {}", quote(&remote_tar)), Some(&release_dir))?;

        if let Some(owner) = settings.owner.as_deref() {
            self.remote.run(
                &format!("chown -R {} {}", quote(owner), quote(release.name())),
                Some(base_dir),
            )?;
        }

        self.releases().point_current_at(&release)?;
        self.restart_services();

        Ok(release)
    }

    /// Build archive and ship it.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError`] if either step fails.
    pub fn make(&self) -> Result<Release> {
        self.build()?;
        self.ship()
    }

    /// Restart services in warn-only mode.
    ///
    /// Fire-and-forget: failures are logged, never propagated. Returns the
    /// number of commands that failed.
    #[instrument(skip(self), level = "debug")]
    pub fn restart_services(&self) -> usize {
        let mut failed = 0;
        for command in &self.definition.services.restart {
            info!("restart: {command}");
            if self.remote.run_warn_only(command, None).is_none() {
                failed += 1;
            }
        }

        failed
    }

    /// Roll back to the release preceding the current one.
    ///
    /// The plan is handed to `confirm` before anything changes. Services are
    /// restarted only if the rollback was applied.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Release`] if planning or applying fails.
    #[instrument(skip(self, confirm), level = "debug")]
    pub fn rollback<F>(&self, confirm: F) -> Result<RollbackOutcome>
    where
        F: FnOnce(&RollbackPlan) -> Confirmation,
    {
        let releases = self.releases();
        let plan = releases.plan_rollback()?;
        let confirmation = confirm(&plan);
        let outcome = releases.confirm_and_apply(plan, confirmation)?;

        if let RollbackOutcome::Applied { .. } = outcome {
            self.restart_services();
        }

        Ok(outcome)
    }
}

/// Deployment error types.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Release management failed.
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// Shell collaborator failed.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// Include pattern is malformed.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// No include pattern matched any file.
    #[error("no files matched the package include patterns")]
    NothingToPackage,

    /// Archive has not been built yet.
    #[error("archive {:?} not found, run build first", .0.display())]
    MissingArchive(PathBuf),

    /// Local file system operation failed.
    #[error("failed to prepare {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

pub(crate) fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
