// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use anyhow::Result;
use releasectl::{
    config::{DeployDefinition, PackageSettings, RemoteSettings, ServiceSettings},
    deploy::Deployer,
    shell::LocalShell,
};
use std::{
    fs::{create_dir_all, write},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// Simulated server and operator machine living in one temporary directory.
///
/// ```text
/// <tmp>/project   application sources, build output in dist/
/// <tmp>/srv       release base directory
/// <tmp>/tmp       remote scratch directory
/// ```
pub(crate) struct SiteFixture {
    root: TempDir,
}

impl SiteFixture {
    pub(crate) fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        for dir in ["project", "srv", "tmp"] {
            create_dir_all(root.path().join(dir))?;
        }

        Ok(Self { root })
    }

    pub(crate) fn base_dir(&self) -> PathBuf {
        self.root.path().join("srv")
    }

    pub(crate) fn project_dir(&self) -> PathBuf {
        self.root.path().join("project")
    }

    pub(crate) fn scratch_dir(&self) -> PathBuf {
        self.root.path().join("tmp")
    }

    pub(crate) fn add_release(&self, name: &str) -> Result<()> {
        let dir = self.base_dir().join(name);
        create_dir_all(&dir)?;
        write(dir.join("app.js"), name)?;
        Ok(())
    }

    pub(crate) fn point_current_at(&self, target: impl AsRef<Path>) -> Result<()> {
        let link = self.base_dir().join("www");
        let _ = std::fs::remove_file(&link);
        symlink(target, link)?;
        Ok(())
    }

    pub(crate) fn current_target(&self) -> Result<PathBuf> {
        Ok(std::fs::read_link(self.base_dir().join("www"))?)
    }

    pub(crate) fn add_project_file(&self, name: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = self.project_dir().join(name);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, contents)?;
        Ok(())
    }

    pub(crate) fn definition(&self, restart: Vec<String>) -> DeployDefinition {
        DeployDefinition {
            remote: RemoteSettings {
                host: "localhost".into(),
                user: String::new(),
                port: None,
                base_dir: self.base_dir().to_string_lossy().into_owned(),
                owner: None,
                tmp_dir: self.scratch_dir().to_string_lossy().into_owned(),
            },
            package: PackageSettings {
                archive: "dist-app.tar.gz".into(),
                dist_dir: PathBuf::from("dist"),
                include: vec!["static".into(), "*.js".into(), "missing".into()],
                exclude: vec!["*.pyc".into()],
            },
            services: ServiceSettings { restart },
            database: None,
        }
    }

    pub(crate) fn deployer(&self, restart: Vec<String>) -> Deployer<LocalShell, LocalShell> {
        Deployer::new(
            self.definition(restart),
            LocalShell::new(),
            LocalShell::new(),
            self.project_dir(),
        )
    }
}
