//! lm-config
//!
//! Layered YAML configuration for the mirror.
//!
//! Documents are merged in order (later layers override earlier ones),
//! converted to JSON, canonicalised and hashed so every ingest run can be
//! attributed to the exact effective config. Config files carry environment
//! variable NAMES for credentials, never the credentials themselves.

pub mod secrets;
mod settings;

pub use settings::{
    DbSettings, ExchangeKeysEnv, ExchangeSettings, FailurePolicy, IngestSettings, MirrorSettings,
    UpstreamSettings, WalletKeysEnv, WalletSettings, DEFAULT_DB_URL_ENV,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Leaf string values starting with any of these abort loading with
/// `CONFIG_SECRET_DETECTED`.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
    "organizations/", // cloud API key resource names
];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn settings(&self) -> Result<MirrorSettings> {
        MirrorSettings::from_config_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty layer parses as null; it must not wipe the layers below it.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Key-sorted compact JSON, so the hash does not depend on layer key order.
fn canonicalize_json(v: &Value) -> Result<String> {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).context("canonical json serialize failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unknown keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

/// A key the typed settings do not declare, located by its config section.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnusedKey {
    /// Dotted section path (`upstream.wallet`), empty for the document root.
    pub section: String,
    pub key: String,
}

impl UnusedKey {
    pub fn path(&self) -> String {
        if self.section.is_empty() {
            self.key.clone()
        } else {
            format!("{}.{}", self.section, self.key)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub unused: Vec<UnusedKey>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused.is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.unused.iter().map(UnusedKey::path).collect()
    }
}

/// Compare the merged document against the sections [`MirrorSettings`]
/// declares (upstream.wallet, upstream.exchange, ingest, db and the
/// `keys_env` maps). Values of declared keys are not inspected, so a list
/// of collection names is never reported.
///
/// `Warn` logs each unknown key and returns the report; `Fail` errors out.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let declared = serde_json::to_value(MirrorSettings::default())
        .context("serialize default settings failed")?;
    let mut unused = Vec::new();
    collect_undeclared(config_json, &declared, "", &mut unused);
    unused.sort();

    let report = UnusedKeyReport { unused };

    if !report.is_clean() {
        match policy {
            UnusedKeyPolicy::Fail => bail!(
                "CONFIG_UNUSED_KEYS: {} unknown config key(s): {:?}",
                report.unused.len(),
                report.paths().into_iter().take(12).collect::<Vec<_>>()
            ),
            UnusedKeyPolicy::Warn => {
                for k in &report.unused {
                    tracing::warn!(section = %k.section, key = %k.key, "config key is not read by the mirror");
                }
            }
        }
    }

    Ok(report)
}

fn collect_undeclared(config: &Value, declared: &Value, section: &str, out: &mut Vec<UnusedKey>) {
    let (Value::Object(config), Value::Object(declared)) = (config, declared) else {
        return;
    };
    for (key, value) in config {
        match declared.get(key) {
            Some(template) => {
                let nested = if section.is_empty() {
                    key.clone()
                } else {
                    format!("{section}.{key}")
                };
                collect_undeclared(value, template, &nested, out);
            }
            None => out.push(UnusedKey {
                section: section.to_string(),
                key: key.clone(),
            }),
        }
    }
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let merged = deep_merge(
            json!({"upstream": {"wallet": {"page_limit": 25, "api_version": "2016-02-18"}}}),
            json!({"upstream": {"wallet": {"page_limit": 100}}}),
        );
        assert_eq!(
            merged,
            json!({"upstream": {"wallet": {"page_limit": 100, "api_version": "2016-02-18"}}})
        );
    }

    #[test]
    fn undeclared_keys_are_reported_by_section() {
        let doc = json!({
            "upstream": {
                "wallet": {"page_limit": 50, "keys_env": {"api_key": "K", "api_pass": "P"}},
                "exchnge": {"enabled": true}
            },
            "ingest": {"collections": ["accounts", "holds"], "retries": 3},
            "metrics": {"port": 9000}
        });
        let report = report_unused_keys(&doc, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(
            report.paths(),
            vec![
                "metrics",
                "ingest.retries",
                "upstream.exchnge",
                "upstream.wallet.keys_env.api_pass",
            ]
        );
    }

    #[test]
    fn short_strings_never_look_like_secrets() {
        assert!(!looks_like_secret("sk-1"));
        assert!(looks_like_secret("sk-live-0123456789"));
        assert!(!looks_like_secret("LM_WALLET_API_KEY"));
    }
}
