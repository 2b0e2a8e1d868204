//! Command handlers: resolve inputs, run one operation, print its report.
//!
//! Reports go to stdout (text or `--json`); progress goes through `tracing`
//! to stderr.
use crate::cli::{CreateArgs, ListArgs, PruneArgs};
use crate::config::Config;
use crate::create::{Builder, CreateReport, CreateRequest};
use crate::listing::{list_box, BoxListing};
use crate::name::{BoxId, BoxName};
use crate::prune::{PruneReport, Pruner};
use crate::util::display_path;
use anyhow::{Context, Result};
use serde::Serialize;

pub fn run_create(config: &Config, args: CreateArgs) -> Result<()> {
    let request = CreateRequest {
        target_box: BoxName::parse(&args.target_box)?,
        box_id: BoxId::parse(&args.box_id)?,
        source_box: args.source_box,
        provision_script: args.provision_script,
    };
    let report = Builder::new(config)
        .create(&request)
        .with_context(|| format!("create {} ({})", request.target_box, request.box_id))?;
    if args.json {
        print_json(&report)?;
    } else {
        print_create_report(config, &report);
    }
    Ok(())
}

pub fn run_prune(config: &Config, args: PruneArgs) -> Result<()> {
    let name = BoxName::parse(&args.target_box)?;
    let report = Pruner::new(config)
        .prune(&name, args.n)
        .with_context(|| format!("prune {name}"))?;
    if args.json {
        print_json(&report)?;
    } else {
        print_prune_report(&report);
    }
    Ok(())
}

pub fn run_list(config: &Config, args: ListArgs) -> Result<()> {
    let name = BoxName::parse(&args.target_box)?;
    let listing = list_box(config, &name).with_context(|| format!("list {name}"))?;
    if !listing.is_consistent() {
        tracing::warn!(box_name = %name, "store and manifest disagree");
    }
    if args.json {
        print_json(&listing)?;
    } else {
        print_listing(&listing);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize report")?;
    println!("{text}");
    Ok(())
}

fn print_create_report(config: &Config, report: &CreateReport) {
    println!(
        "created {} version {} (box id {})",
        report.target_box, report.version, report.box_id
    );
    println!(
        "  artifact: {}",
        display_path(&report.artifact, Some(config.install_dir.as_path()))
    );
    println!("  checksum: sha256:{}", report.checksum);
    println!("  url:      {}", report.url);
}

fn print_prune_report(report: &PruneReport) {
    if report.is_noop() {
        println!(
            "{}: nothing to prune ({} version(s) kept)",
            report.target_box,
            report.kept.len()
        );
        return;
    }
    println!("{}: kept {}", report.target_box, join_versions(&report.kept));
    if !report.removed.is_empty() {
        println!("  removed: {}", join_versions(&report.removed));
    }
    if !report.missing_artifacts.is_empty() {
        println!(
            "  already missing from store: {}",
            join_versions(&report.missing_artifacts)
        );
    }
    if !report.orphans_removed.is_empty() {
        println!(
            "  orphaned artifacts removed: {}",
            join_versions(&report.orphans_removed)
        );
    }
}

fn print_listing(listing: &BoxListing) {
    if listing.versions.is_empty() {
        println!("{}: no published versions", listing.target_box);
    } else {
        println!("{}:", listing.target_box);
    }
    for entry in &listing.versions {
        let marker = if entry.artifact_present {
            ""
        } else {
            "  [artifact missing]"
        };
        println!(
            "  {:>4}  {:<16}  {}{marker}",
            entry.version, entry.box_id, entry.created_at
        );
    }
    if !listing.orphaned_artifacts.is_empty() {
        println!(
            "  orphaned artifacts (not in manifest): {}",
            join_versions(&listing.orphaned_artifacts)
        );
    }
}

fn join_versions(versions: &[u64]) -> String {
    if versions.is_empty() {
        return "none".to_string();
    }
    versions
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
