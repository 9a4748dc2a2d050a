use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn lm() -> Command {
    let mut cmd = Command::cargo_bin("lm").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn help_lists_operator_commands() {
    lm().arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ingest")
                .and(predicate::str::contains("replay"))
                .and(predicate::str::contains("exceptions"))
                .and(predicate::str::contains("config-hash")),
        );
}

#[test]
fn config_hash_is_stable_across_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.yaml");
    let b = dir.path().join("b.yaml");
    std::fs::write(&a, "ingest:\n  on_failure: halt\ndb:\n  url_env: MIRROR_DB\n").unwrap();
    std::fs::write(&b, "db:\n  url_env: MIRROR_DB\ningest:\n  on_failure: halt\n").unwrap();

    let hash_of = |p: &std::path::Path| {
        let out = lm().arg("config-hash").arg(p).output().unwrap();
        assert!(out.status.success());
        let stdout = String::from_utf8(out.stdout).unwrap();
        stdout.lines().next().unwrap().to_string()
    };
    let ha = hash_of(&a);
    assert!(ha.starts_with("config_hash="), "{ha}");
    assert_eq!(ha, hash_of(&b));
}

#[test]
fn later_layer_overrides_earlier() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let local = dir.path().join("local.yaml");
    std::fs::write(&base, "ingest:\n  on_failure: skip\n").unwrap();
    std::fs::write(&local, "ingest:\n  on_failure: halt\n").unwrap();

    lm().arg("config-hash")
        .arg(&base)
        .arg(&local)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""on_failure":"halt""#));
}

#[test]
fn literal_secret_in_config_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("leaky.yaml");
    std::fs::write(
        &p,
        "upstream:\n  wallet:\n    keys_env:\n      api_key: sk_live_abcdefghijklmnop\n",
    )
    .unwrap();

    lm().arg("config-hash")
        .arg(&p)
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("CONFIG_SECRET_DETECTED")
                .and(predicate::str::contains("sk_live_abcdefghijklmnop").not()),
        );
}

#[test]
fn shipped_base_config_loads_cleanly() {
    let base = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../config/defaults/base.yaml")
        .canonicalize()
        .unwrap();

    lm().arg("config-hash")
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""url_env":"LM_DATABASE_URL""#));

    let loaded = lm_config::load_layered_yaml(&[base.to_str().unwrap()]).unwrap();
    assert_eq!(loaded.settings().unwrap(), lm_config::MirrorSettings::default());
    let report =
        lm_config::report_unused_keys(&loaded.config_json, lm_config::UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
