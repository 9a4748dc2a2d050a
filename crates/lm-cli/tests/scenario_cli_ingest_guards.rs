use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const UNSET_KEY: &str = "LM_CLI_TEST_UNSET_WALLET_KEY";
const UNSET_SECRET: &str = "LM_CLI_TEST_UNSET_WALLET_SECRET";

fn lm_in(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("lm").unwrap();
    cmd.current_dir(dir)
        .env("RUST_LOG", "off")
        .env_remove(UNSET_KEY)
        .env_remove(UNSET_SECRET);
    cmd
}

#[test]
fn ingest_requires_a_config() {
    let dir = tempfile::tempdir().unwrap();
    lm_in(dir.path())
        .args(["ingest", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn ingest_names_the_missing_credential_variable() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("mirror.yaml");
    std::fs::write(
        &cfg,
        format!(
            "upstream:\n  wallet:\n    keys_env:\n      api_key: {UNSET_KEY}\n      api_secret: {UNSET_SECRET}\n"
        ),
    )
    .unwrap();

    lm_in(dir.path())
        .arg("ingest")
        .arg("--config")
        .arg(&cfg)
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING").and(predicate::str::contains(UNSET_KEY)));
}

#[test]
fn strict_config_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("mirror.yaml");
    std::fs::write(&cfg, "ingest:\n  on_falure: halt\n").unwrap();

    lm_in(dir.path())
        .arg("ingest")
        .arg("--config")
        .arg(&cfg)
        .args(["--dry-run", "--strict-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn unknown_collection_is_rejected_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("mirror.yaml");
    // keys_env pointed at variables every environment has.
    std::fs::write(
        &cfg,
        "upstream:\n  wallet:\n    base_url: http://127.0.0.1:9\n    keys_env:\n      api_key: PATH\n      api_secret: PATH\n",
    )
    .unwrap();

    lm_in(dir.path())
        .arg("ingest")
        .arg("--config")
        .arg(&cfg)
        .args(["--dry-run", "--only", "trades"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown collection 'trades'"));
}
