//! Command handlers for the `lm` binary.
//!
//! Shared helpers live here; command-specific logic lives in the submodules.

pub mod exceptions;
pub mod ingest;

use std::process::ExitCode;

use anyhow::Result;
use lm_config::{LoadedConfig, UnusedKeyPolicy};
use lm_ingest::IngestReport;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Exit status for a finished run: 2 when any collection halted.
pub fn exit_for(report: &IngestReport) -> ExitCode {
    if report.halted() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

/// Load layered config and check it for keys nothing reads.
pub fn load_config(paths: &[String], strict: bool) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = lm_config::load_layered_yaml(&path_refs)?;
    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    lm_config::report_unused_keys(&loaded.config_json, policy)?;
    Ok(loaded)
}

/// One `key=value` summary block on stdout, per-collection lines first.
pub fn print_report(report: &IngestReport) {
    for c in &report.collections {
        println!(
            "collection={} parent={} pages={} records={} inserted={} diff_logged={} new_exceptions={} already_open={} no_change={} failed={} shape_violations={} kind_halted={} halted={}",
            c.collection,
            c.parent.as_deref().unwrap_or("-"),
            c.pages,
            c.records,
            c.inserted,
            c.diff_logged,
            c.new_exceptions,
            c.already_open,
            c.no_change,
            c.failed,
            c.shape_violations,
            c.kind_halted,
            c.halted.as_deref().unwrap_or("-"),
        );
    }
    for s in &report.skipped {
        println!("skipped={} reason={}", s.collection, s.reason);
    }
    for k in &report.halted_kinds {
        println!("halted_kind={k}");
    }
    for i in &report.incidents {
        println!(
            "incident collection={} kind={} key={} field={} reason={} message={}",
            i.collection,
            i.kind,
            i.key.as_deref().unwrap_or("-"),
            i.field.as_deref().unwrap_or("-"),
            i.reason,
            i.message,
        );
    }

    let t = report.totals();
    println!("run_id={}", report.run_id);
    if let Some(h) = &report.config_hash {
        println!("config_hash={h}");
    }
    println!("records={}", t.records);
    println!("inserted={}", t.inserted);
    println!("diff_logged={}", t.diff_logged);
    println!("new_exceptions={}", t.new_exceptions);
    println!("already_open={}", t.already_open);
    println!("no_change={}", t.no_change);
    println!("failed={}", t.failed);
    println!("halted={}", report.halted());
}
