// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use releasectl::{
    backup::list_backups,
    config::{DatabaseSettings, DeployDefinition},
    deploy::Deployer,
    path::{locate_definition, DEFINITION_FILE},
    release::rollback::{Confirmation, RollbackOutcome},
    shell::{LocalShell, SshShell},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, Select};
use std::{fs::write, path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "releasectl [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to deployment definition.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = self.config;
        match self.command {
            Command::Init(opts) => run_init(opts),
            Command::Build => run_build(config),
            Command::Ship => run_ship(config),
            Command::Make => run_make(config),
            Command::Restart => run_restart(config),
            Command::Releases => run_releases(config),
            Command::Rollback(opts) => run_rollback(config, opts),
            Command::Backup => run_backup(config),
            Command::Restore(opts) => run_restore(config, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Write default deployment definition into current directory.
    #[command(override_usage = "releasectl init [options]")]
    Init(InitOptions),

    /// Package application into archive.
    Build,

    /// Ship archive to remote host as new release.
    Ship,

    /// Build archive, then ship it.
    Make,

    /// Restart services on remote host.
    Restart,

    /// List releases on remote host.
    Releases,

    /// Roll current link back to previous release.
    #[command(override_usage = "releasectl rollback [options]")]
    Rollback(RollbackOptions),

    /// Back up remote database into local backup directory.
    Backup,

    /// Restore local database from backup.
    #[command(override_usage = "releasectl restore [options]")]
    Restore(RestoreOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Host name of remote server.
    #[arg(long, value_name = "host")]
    pub host: Option<String>,

    /// Remote base directory housing releases.
    #[arg(short, long, value_name = "path")]
    pub base_dir: Option<String>,

    /// Include database section.
    #[arg(short, long)]
    pub database: bool,

    /// Overwrite existing deployment definition.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RollbackOptions {
    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestoreOptions {
    /// Number of backup to restore, newest is 0.
    #[arg(short, long, value_name = "number")]
    pub index: Option<usize>,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn open_deployer(config: Option<PathBuf>) -> Result<Deployer<SshShell, LocalShell>> {
    let project_dir = std::env::current_dir()?;
    let path = match config {
        Some(path) => path,
        None => locate_definition(&project_dir)?,
    };
    let definition = DeployDefinition::load(&path)
        .with_context(|| format!("cannot load {}", path.display()))?;

    let settings = &definition.remote;
    let remote = SshShell::new(&settings.user, &settings.host, settings.port);
    info!("using {} on {}", path.display(), remote.destination());

    Ok(Deployer::new(definition, remote, LocalShell::new(), project_dir))
}

fn run_init(opts: InitOptions) -> Result<()> {
    let path = std::env::current_dir()?.join(DEFINITION_FILE);
    if path.exists() && !opts.force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }

    let mut definition = DeployDefinition::default();
    if let Some(host) = opts.host {
        definition.remote.host = host;
    }
    if let Some(base_dir) = opts.base_dir {
        definition.remote.base_dir = base_dir;
    }
    if opts.database {
        definition.database = Some(DatabaseSettings::default());
    }

    write(&path, definition.to_string())?;
    info!("wrote {}", path.display());

    Ok(())
}

fn run_build(config: Option<PathBuf>) -> Result<()> {
    let deployer = open_deployer(config)?;
    let archive = deployer.build()?;
    info!("built {}", archive.display());
    Ok(())
}

fn run_ship(config: Option<PathBuf>) -> Result<()> {
    let deployer = open_deployer(config)?;
    let release = deployer.ship()?;
    info!("shipped {release}");
    Ok(())
}

fn run_make(config: Option<PathBuf>) -> Result<()> {
    let deployer = open_deployer(config)?;
    let release = deployer.make()?;
    info!("shipped {release}");
    Ok(())
}

fn run_restart(config: Option<PathBuf>) -> Result<()> {
    let deployer = open_deployer(config)?;
    let failed = deployer.restart_services();
    if failed > 0 {
        warn!("{failed} restart commands failed");
    }
    Ok(())
}

fn run_releases(config: Option<PathBuf>) -> Result<()> {
    let deployer = open_deployer(config)?;
    let releases = deployer.releases();
    let list = releases.list_releases()?;
    if list.is_empty() {
        warn!("no releases found in {}", releases.base_dir());
        return Ok(());
    }

    let current = match releases.resolve_current() {
        Ok(current) => Some(current),
        Err(error) => {
            warn!("{error}");
            None
        }
    };

    for release in &list {
        if Some(release) == current.as_ref() {
            println!("* {release}");
        } else {
            println!("  {release}");
        }
    }

    Ok(())
}

fn run_rollback(config: Option<PathBuf>, opts: RollbackOptions) -> Result<()> {
    let deployer = open_deployer(config)?;
    let outcome = deployer.rollback(|plan| {
        println!("{plan}");
        if opts.yes {
            return Confirmation::Approved;
        }

        match Confirm::new("continue?").with_default(false).prompt() {
            Ok(answer) => Confirmation::from(answer),
            Err(error) => {
                warn!("{error}");
                Confirmation::Declined
            }
        }
    })?;

    match outcome {
        RollbackOutcome::Applied { from, to } => info!("rolled back from {from} to {to}"),
        RollbackOutcome::Cancelled => info!("rollback cancelled"),
    }

    Ok(())
}

fn run_backup(config: Option<PathBuf>) -> Result<()> {
    let deployer = open_deployer(config)?;
    let archive = deployer.backup()?;
    info!("backup saved to {}", archive.display());
    Ok(())
}

fn run_restore(config: Option<PathBuf>, opts: RestoreOptions) -> Result<()> {
    let deployer = open_deployer(config)?;
    let backups = list_backups(deployer.backup_dir()?)?;
    let index = match opts.index {
        Some(index) => index,
        None if backups.is_empty() => bail!("no backup files found"),
        None => Select::new("restore file:", backups).raw_prompt()?.index,
    };

    let plan = deployer.plan_restore(index)?;
    if !opts.yes {
        let question = format!("{plan}?");
        if !Confirm::new(&question).with_default(false).prompt()? {
            info!("restore cancelled");
            return Ok(());
        }
    }

    let password = Password::new("mysql root password:")
        .without_confirmation()
        .prompt()?;
    deployer.restore(&plan, &password)?;

    Ok(())
}
