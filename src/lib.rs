// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ship timestamped releases of a web application to a remote host, and roll
//! them back.
//!
//! Every deployment unpacks the application archive into a new
//! `www-<timestamp>` directory under the remote base directory, then moves
//! the `www` symlink onto it. Rolling back moves the link onto the release
//! right before the current one, after the operator confirms the plan.
//!
//! # See Also
//!
//! 1. [`release`] for release naming, ordering, and the current link.
//! 2. [`deploy`] for the build, ship, and restart tasks.
//! 3. [`backup`] for database backup and restore.

pub mod backup;
pub mod config;
pub mod deploy;
pub mod path;
pub mod release;
pub mod shell;
