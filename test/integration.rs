// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::SiteFixture;

use anyhow::Result;
use pretty_assertions::assert_eq;
use releasectl::{
    deploy::DeployError,
    release::{
        rollback::{Confirmation, RollbackOutcome},
        Release, ReleaseDirectory, ReleaseError,
    },
    shell::{quote, LocalShell},
};
use std::{
    fs::{create_dir, read_to_string, remove_dir_all, write},
    path::PathBuf,
};

fn names(releases: &[Release]) -> Vec<&str> {
    releases.iter().map(Release::name).collect()
}

fn directory(site: &SiteFixture) -> ReleaseDirectory<LocalShell> {
    ReleaseDirectory::new(
        LocalShell::new(),
        site.base_dir().to_string_lossy().into_owned(),
        None,
    )
}

#[test]
fn list_releases_newest_first_without_strays() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_release("www-20-05-01_10.00.00")?;
    site.add_release("www-20-04-01_10.00.00")?;
    site.add_release("www-20-06-01_10.00.00")?;
    site.add_release("logs")?;
    write(site.base_dir().join("www-20-07-01_10.00.00"), "plain file")?;
    site.point_current_at("www-20-06-01_10.00.00")?;

    let dir = directory(&site);
    let first = dir.list_releases()?;
    assert_eq!(
        names(&first),
        vec![
            "www-20-06-01_10.00.00",
            "www-20-05-01_10.00.00",
            "www-20-04-01_10.00.00",
        ]
    );

    // Nothing deployed in between, so nothing changes.
    assert_eq!(dir.list_releases()?, first);

    Ok(())
}

#[test]
fn list_releases_accepts_empty_base_dir() -> Result<()> {
    let site = SiteFixture::new()?;
    assert!(directory(&site).list_releases()?.is_empty());
    Ok(())
}

#[test]
fn resolve_current_rejects_plain_file() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_release("www-20-06-01_10.00.00")?;
    write(site.base_dir().join("www"), "not a link")?;

    let result = directory(&site).resolve_current();
    assert!(matches!(result, Err(ReleaseError::NotASymlink { .. })));

    Ok(())
}

#[test]
fn resolve_current_rejects_missing_link() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_release("www-20-06-01_10.00.00")?;

    let result = directory(&site).resolve_current();
    assert!(matches!(result, Err(ReleaseError::NotASymlink { .. })));

    Ok(())
}

#[test]
fn resolve_current_rejects_deleted_target() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_release("www-20-05-01_10.00.00")?;
    site.add_release("www-20-06-01_10.00.00")?;
    site.point_current_at("www-20-06-01_10.00.00")?;
    remove_dir_all(site.base_dir().join("www-20-06-01_10.00.00"))?;

    let result = directory(&site).resolve_current();
    assert!(matches!(
        result,
        Err(ReleaseError::UnknownRelease(name)) if name == "www-20-06-01_10.00.00"
    ));

    Ok(())
}

#[test]
fn resolve_current_rejects_link_outside_base_dir() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_release("www-20-05-01_10.00.00")?;
    site.add_release("www-20-06-01_10.00.00")?;

    let foreign = site.scratch_dir().join("www-20-06-01_10.00.00");
    create_dir(&foreign)?;
    site.point_current_at(&foreign)?;

    let result = directory(&site).resolve_current();
    assert!(matches!(
        result,
        Err(ReleaseError::UnknownRelease(target)) if PathBuf::from(&target) == foreign
    ));

    Ok(())
}

#[test]
fn resolve_current_accepts_absolute_link_into_base_dir() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_release("www-20-05-01_10.00.00")?;
    site.add_release("www-20-06-01_10.00.00")?;
    site.point_current_at(site.base_dir().join("www-20-06-01_10.00.00"))?;

    let current = directory(&site).resolve_current()?;
    assert_eq!(current.name(), "www-20-06-01_10.00.00");

    Ok(())
}

#[test]
fn apply_rollback_then_resolve_current() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_release("www-20-05-01_10.00.00")?;
    site.add_release("www-20-06-01_10.00.00")?;
    site.point_current_at("www-20-06-01_10.00.00")?;

    let dir = directory(&site);
    let target: Release = "www-20-05-01_10.00.00".parse()?;
    dir.apply_rollback(&target)?;

    assert_eq!(dir.resolve_current()?, target);
    assert_eq!(site.current_target()?, PathBuf::from("www-20-05-01_10.00.00"));
    assert!(!site.base_dir().join("www.next").exists());

    Ok(())
}

#[test]
fn ship_build_and_roll_back() -> Result<()> {
    let site = SiteFixture::new()?;
    site.add_project_file("app.js", "console.log('v1')")?;
    site.add_project_file("static/site.css", "body {}")?;
    site.add_project_file("static/cache.pyc", "junk")?;
    site.add_project_file("notes.md", "not packaged")?;

    let marker = site.scratch_dir().join("restarted");
    let deployer = site.deployer(vec![
        format!("echo restart >> {}", quote(marker.to_string_lossy())),
        "false".into(),
    ]);

    deployer.build()?;
    let first = deployer.ship_as(Release::from_timestamp("20-05-01_10.00.00")?)?;
    let unpacked = site.base_dir().join(first.name());
    assert!(unpacked.join("app.js").is_file());
    assert!(unpacked.join("static/site.css").is_file());
    assert!(!unpacked.join("static/cache.pyc").exists());
    assert!(!unpacked.join("notes.md").exists());

    site.add_project_file("app.js", "console.log('v2')")?;
    deployer.build()?;
    let second = deployer.ship_as(Release::from_timestamp("20-06-01_10.00.00")?)?;
    assert_eq!(deployer.releases().resolve_current()?, second);
    assert_eq!(
        read_to_string(site.base_dir().join("www/app.js"))?,
        "console.log('v2')"
    );

    let declined = deployer.rollback(|_| Confirmation::Declined)?;
    assert_eq!(declined, RollbackOutcome::Cancelled);
    assert_eq!(deployer.releases().resolve_current()?, second);

    let mut shown = String::new();
    let applied = deployer.rollback(|plan| {
        shown = plan.to_string();
        Confirmation::Approved
    })?;
    assert_eq!(
        applied,
        RollbackOutcome::Applied {
            from: second.clone(),
            to: first.clone(),
        }
    );
    assert!(shown.contains("Rollback to ---> www-20-05-01_10.00.00"));
    assert_eq!(deployer.releases().resolve_current()?, first);

    // Two ships and one applied rollback, failing restart command ignored.
    assert_eq!(read_to_string(&marker)?.lines().count(), 3);

    let oldest = deployer.rollback(|_| Confirmation::Approved);
    assert!(matches!(
        oldest,
        Err(DeployError::Release(ReleaseError::NoOlderVersion(_)))
    ));

    Ok(())
}

#[test]
fn ship_requires_built_archive() -> Result<()> {
    let site = SiteFixture::new()?;
    let result = site.deployer(Vec::new()).ship();
    assert!(matches!(result, Err(DeployError::MissingArchive(_))));
    Ok(())
}
