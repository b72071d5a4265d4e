// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Database backup and restore.
//!
//! Backups are taken on the remote host with `mysqldump`, compressed, and
//! downloaded into the local backup directory as
//! `backup-<database>-<timestamp>.sql.tar.gz`. Restores go the other way,
//! but only ever into the operator's local database.

use crate::{
    config::DatabaseSettings,
    deploy::{path_str, Deployer},
    release::TIMESTAMP_FORMAT,
    shell::{quote, remote_join, Shell, ShellError, Transfer},
};

use chrono::Local;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_SUFFIX: &str = ".sql.tar.gz";

/// List backup archives in directory, newest first.
///
/// A missing directory simply has no backups.
///
/// # Errors
///
/// - Return [`BackupError::Io`] if the directory cannot be read.
pub fn list_backups(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let entries = match read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(BackupError::Io {
                source: err,
                path: dir.as_ref().to_path_buf(),
            })
        }
    };

    let mut backups = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX))
        .collect::<Vec<_>>();
    backups.sort_by(|a, b| b.cmp(a));

    Ok(backups)
}

/// Selected backup waiting to be restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlan {
    backup_dir: PathBuf,
    archive: String,
    database: DatabaseSettings,
}

impl RestorePlan {
    /// File name of the selected archive.
    pub fn archive(&self) -> &str {
        self.archive.as_str()
    }

    /// File name of the SQL dump inside the archive.
    pub fn sql_file(&self) -> &str {
        self.archive.strip_suffix(".tar.gz").unwrap_or(&self.archive)
    }

    /// Database that gets dropped and recreated.
    pub fn database(&self) -> &str {
        self.database.name.as_str()
    }
}

impl Display for RestorePlan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "restore {} into local database {:?}",
            self.archive, self.database.name
        )
    }
}

impl<R, L> Deployer<R, L>
where
    R: Shell + Transfer,
    L: Shell,
{
    fn database(&self) -> Result<&DatabaseSettings> {
        self.definition
            .database
            .as_ref()
            .ok_or(BackupError::NoDatabase)
    }

    /// Local directory holding backup archives.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::NoDatabase`] if no database is configured.
    pub fn backup_dir(&self) -> Result<PathBuf> {
        Ok(self.project_dir.join(&self.database()?.backup_dir))
    }

    /// Dump remote database and download it into the backup directory.
    ///
    /// Returns local path of the downloaded archive.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::NoDatabase`] if no database is configured.
    /// - Return [`BackupError::Io`] if backup directory cannot be created.
    /// - Return [`BackupError::Shell`] if any command fails.
    pub fn backup(&self) -> Result<PathBuf> {
        self.backup_stamped(&Local::now().format(TIMESTAMP_FORMAT).to_string())
    }

    #[instrument(skip(self), level = "debug")]
    pub(crate) fn backup_stamped(&self, stamp: &str) -> Result<PathBuf> {
        let database = self.database()?;
        let tmp_dir = self.definition.remote.tmp_dir.as_str();
        let sql = format!("{BACKUP_PREFIX}{}-{stamp}.sql", database.name);
        let archive = format!("{sql}.tar.gz");

        info!("dump database {:?} into {archive}", database.name);
        self.remote.run_redacted(
            &format!(
                "mysqldump --user={} --password={} --skip-opt --add-drop-table \
                 --default-character-set=utf8 --quick {} > {}",
                quote(&database.user),
                quote(&database.password),
                quote(&database.name),
                quote(&sql),
            ),
            &[database.password.as_str()],
            Some(tmp_dir),
        )?;
        self.remote
            .run(&format!("tar -czvf {} {}", quote(&archive), quote(&sql)), Some(tmp_dir))?;

        let backup_dir = self.backup_dir()?;
        mkdirp::mkdirp(&backup_dir).map_err(|source| BackupError::Io {
            source,
            path: backup_dir.clone(),
        })?;
        self.remote.get(&remote_join(tmp_dir, &archive), &backup_dir)?;

        self.remote
            .run(&format!("rm -f {} {}", quote(&sql), quote(&archive)), Some(tmp_dir))?;

        Ok(backup_dir.join(archive))
    }

    /// Select backup to restore by its position in [`list_backups`].
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::NoDatabase`] if no database is configured.
    /// - Return [`BackupError::NoBackups`] if there are no backups.
    /// - Return [`BackupError::InvalidSelection`] if index is out of range.
    pub fn plan_restore(&self, index: usize) -> Result<RestorePlan> {
        let database = self.database()?.clone();
        let backup_dir = self.backup_dir()?;
        let backups = list_backups(&backup_dir)?;
        if backups.is_empty() {
            return Err(BackupError::NoBackups(backup_dir));
        }

        let archive = backups
            .get(index)
            .cloned()
            .ok_or(BackupError::InvalidSelection {
                index,
                count: backups.len(),
            })?;

        Ok(RestorePlan {
            backup_dir,
            archive,
            database,
        })
    }

    /// Restore backup into the local database.
    ///
    /// Drops and recreates the database, grants the application user, then
    /// loads the dump. The extracted dump is removed afterwards, even if
    /// loading it failed.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Shell`] if any command fails.
    #[instrument(skip(self, plan, root_password), level = "debug")]
    pub fn restore(&self, plan: &RestorePlan, root_password: &str) -> Result<()> {
        info!("start {plan}");
        let db = &plan.database;
        let account = format!("'{}'@'localhost'", db.user.replace('\'', "''"));
        let statements = [
            format!("drop database if exists `{}`;", db.name),
            format!("create database `{}`;", db.name),
            format!(
                "create user if not exists {account} identified by '{}';",
                db.password.replace('\'', "''")
            ),
            format!(
                "grant select, insert, update, delete on `{}`.* to {account};",
                db.name
            ),
        ];

        let secrets = [root_password, db.password.as_str()];
        let mysql = format!("mysql -uroot --password={}", quote(root_password));
        for statement in statements {
            self.local
                .run_redacted(&format!("{mysql} -e {}", quote(statement)), &secrets, None)?;
        }

        let cwd = path_str(&plan.backup_dir);
        self.local
            .run(&format!("tar -xzvf {}", quote(plan.archive())), Some(&cwd))?;

        // INVARIANT: Extracted dump never outlives the restore.
        let loaded = self.local.run_redacted(
            &format!("{mysql} {} < {}", quote(&db.name), quote(plan.sql_file())),
            &secrets,
            Some(&cwd),
        );
        let cleaned = self
            .local
            .run(&format!("rm -f {}", quote(plan.sql_file())), Some(&cwd));
        loaded?;
        cleaned?;

        info!("restored {} into {:?}", plan.archive(), db.name);
        Ok(())
    }
}

/// Backup error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Deployment definition has no database section.
    #[error("no [database] section in deployment definition")]
    NoDatabase,

    /// Backup directory holds no backups.
    #[error("no backup files found in {:?}", .0.display())]
    NoBackups(PathBuf),

    /// Selected backup does not exist.
    #[error("invalid backup number {index}, expected 0..{count}")]
    InvalidSelection { index: usize, count: usize },

    /// Shell collaborator failed.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// Local file system operation failed.
    #[error("failed to access backup directory {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
