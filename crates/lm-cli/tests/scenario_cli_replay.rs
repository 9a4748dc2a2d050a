use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn lm_in(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("lm").unwrap();
    cmd.current_dir(dir).env("RUST_LOG", "off");
    cmd
}

fn address_line(id: &str) -> String {
    format!(
        r#"{{"kind":"address","fields":{{"id":{{"kind":"text","value":"{id}"}},"address":{{"kind":"text","value":"1{id}"}}}},"raw":{{"id":"{id}","address":"1{id}"}}}}"#
    )
}

const KEYLESS_ADDRESS: &str =
    r#"{"kind":"address","fields":{"address":{"kind":"text","value":"1orphan"}},"raw":{"address":"1orphan"}}"#;

#[test]
fn dry_run_replay_reconciles_cached_records() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("capture.jsonl");
    std::fs::write(
        &cache,
        format!("{}\n\n{}\n", address_line("addr-1"), address_line("addr-2")),
    )
    .unwrap();

    lm_in(dir.path())
        .arg("replay")
        .arg("--cache")
        .arg(&cache)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("inserted=2")
                .and(predicate::str::contains("halted=false"))
                .and(predicate::str::contains("dry_run=true")),
        );
}

#[test]
fn halted_replay_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("capture.jsonl");
    std::fs::write(
        &cache,
        format!("{KEYLESS_ADDRESS}\n{}\n", address_line("addr-1")),
    )
    .unwrap();
    let cfg = dir.path().join("mirror.yaml");
    std::fs::write(&cfg, "ingest:\n  on_failure: halt\n").unwrap();

    lm_in(dir.path())
        .arg("replay")
        .arg("--cache")
        .arg(&cache)
        .arg("--config")
        .arg(&cfg)
        .arg("--dry-run")
        .assert()
        .code(2)
        .stdout(
            predicate::str::contains("reason=MISSING_KEY_FIELD")
                .and(predicate::str::contains("halted=true"))
                .and(predicate::str::contains("inserted=0")),
        );
}

#[test]
fn skip_policy_replays_past_a_bad_record() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("capture.jsonl");
    std::fs::write(
        &cache,
        format!("{KEYLESS_ADDRESS}\n{}\n", address_line("addr-1")),
    )
    .unwrap();

    lm_in(dir.path())
        .arg("replay")
        .arg("--cache")
        .arg(&cache)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("failed=1").and(predicate::str::contains("inserted=1")));
}

#[test]
fn corrupt_cache_names_the_line() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("capture.jsonl");
    std::fs::write(&cache, format!("{}\nnot json\n", address_line("addr-1"))).unwrap();

    lm_in(dir.path())
        .arg("replay")
        .arg("--cache")
        .arg(&cache)
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains(":2: invalid cached record"));
}
