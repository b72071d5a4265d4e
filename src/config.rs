// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the deployment definition file that releasectl
//! reads to learn where the application gets shipped to, what goes into its
//! archive, which services to bounce, and which database to back up.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Deployment definition layout.
///
/// # General Layout
///
/// A deployment definition is composed of four parts: the remote host and
/// its release base directory, the packaging rules for the application
/// archive, the services to restart after the current link moves, and an
/// optional database section for backup and restore.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DeployDefinition {
    /// Remote host settings.
    pub remote: RemoteSettings,

    /// Application archive settings.
    #[serde(default)]
    pub package: PackageSettings,

    /// Service restart settings.
    #[serde(default)]
    pub services: ServiceSettings,

    /// Database backup settings.
    pub database: Option<DatabaseSettings>,
}

impl DeployDefinition {
    /// Load deployment definition from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not a valid definition.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_to_string(path.as_ref())
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?
            .parse()
    }
}

impl FromStr for DeployDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut definition: DeployDefinition =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on local path fields.
        definition.package.dist_dir = expand_path(&definition.package.dist_dir)?;
        if let Some(database) = definition.database.as_mut() {
            database.backup_dir = expand_path(&database.backup_dir)?;
        }

        Ok(definition)
    }
}

impl Display for DeployDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Remote host settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RemoteSettings {
    /// Host name or address of the server.
    pub host: String,

    /// User to log in as.
    #[serde(default)]
    pub user: String,

    /// SSH port, when not the default.
    pub port: Option<u16>,

    /// Directory housing all releases and the current link.
    pub base_dir: String,

    /// Ownership to apply to new releases and the current link.
    pub owner: Option<String>,

    /// Scratch directory for uploads and dumps.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: "<put host here>".into(),
            user: "root".into(),
            port: None,
            base_dir: "/srv/app".into(),
            owner: Some("www-data:www-data".into()),
            tmp_dir: default_tmp_dir(),
        }
    }
}

/// Application archive settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PackageSettings {
    /// File name of the archive.
    pub archive: String,

    /// Local directory the archive is written into.
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    /// Glob patterns of files to pack, relative to the project directory.
    #[serde(default)]
    pub include: Vec<String>,

    /// Patterns handed to tar as exclusions.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl PackageSettings {
    /// Local path of the archive.
    pub fn archive_path(&self) -> PathBuf {
        self.dist_dir.join(&self.archive)
    }
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            archive: "dist-app.tar.gz".into(),
            dist_dir: default_dist_dir(),
            include: ["controllers", "models", "static", "views", "*.js", "favicon.ico"]
                .map(String::from)
                .to_vec(),
            exclude: [".*", "*.py", "*.pyc", "*.pyo", "*.psd"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Service restart settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ServiceSettings {
    /// Commands run in warn-only mode after the current link moves.
    #[serde(default)]
    pub restart: Vec<String>,
}

/// Database backup settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    /// Name of the database.
    pub name: String,

    /// Application database user.
    pub user: String,

    /// Application database password.
    pub password: String,

    /// Local directory backups are downloaded into.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: "app".into(),
            user: "www".into(),
            password: "www".into(),
            backup_dir: default_backup_dir(),
        }
    }
}

fn default_tmp_dir() -> String {
    "/tmp".into()
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backup")
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read deployment definition at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
