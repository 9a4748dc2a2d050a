//! lm-denest
//!
//! Denester: one upstream JSON document in, zero or more [`FlatRecord`]s out.
//!
//! Rules:
//! - a `data` envelope is unwrapped; a single object is a one-element collection
//! - nested objects merge into the parent as `{field}_{subfield}`; a sub-field
//!   named `amount` replaces the parent field itself
//! - payment-method `limits` fan out into sibling `limit` records
//! - exchange `fees` lists fan out into sibling `fee` records
//! - fields the kind's shape declares as documents are kept whole
//! - any other list is a [`ShapeViolation`]
//!
//! Siblings follow their parent in the output. No IO.

use std::fmt;

use lm_schemas::{FieldType, FieldValue, FlatRecord, ResourceKind, Shape};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Owning parent of the documents being flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub kind: ResourceKind,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenContext {
    /// Kind used when a document carries no recognised `resource` tag.
    pub default_kind: Option<ResourceKind>,
    pub parent: Option<ParentRef>,
}

impl FlattenContext {
    pub fn of(kind: ResourceKind) -> Self {
        Self {
            default_kind: Some(kind),
            parent: None,
        }
    }

    pub fn with_parent(mut self, kind: ResourceKind, id: impl Into<String>) -> Self {
        self.parent = Some(ParentRef {
            kind,
            id: id.into(),
        });
        self
    }
}

/// A document field has a shape the Denester refuses to coerce.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeViolation {
    /// Dotted path of the offending field (`""` for the document itself).
    pub field: String,
    pub reason: String,
    /// The whole document being flattened, for operator replay.
    pub raw: Value,
}

impl fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "shape violation: {}", self.reason)
        } else {
            write!(f, "shape violation at '{}': {}", self.field, self.reason)
        }
    }
}

impl std::error::Error for ShapeViolation {}

/// Flatten a document (or an enveloped page of documents).
///
/// Fails on the first shape violation; use [`flatten_each`] to isolate
/// failures per element.
pub fn flatten(document: &Value, ctx: &FlattenContext) -> Result<Vec<FlatRecord>, ShapeViolation> {
    let mut out = Vec::new();
    for item in flatten_each(document, ctx) {
        out.extend(item?);
    }
    Ok(out)
}

/// Flatten every element of a document independently.
pub fn flatten_each(
    document: &Value,
    ctx: &FlattenContext,
) -> Vec<Result<Vec<FlatRecord>, ShapeViolation>> {
    match unwrap_envelope(document) {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(|item| flatten_one(item, ctx)).collect(),
        other => vec![flatten_one(other, ctx)],
    }
}

fn unwrap_envelope(doc: &Value) -> &Value {
    if let Value::Object(map) = doc {
        if let Some(data) = map.get("data") {
            let envelope_only = map
                .keys()
                .all(|k| matches!(k.as_str(), "data" | "pagination" | "warnings" | "errors"));
            if envelope_only {
                return data;
            }
        }
    }
    doc
}

fn flatten_one(item: &Value, ctx: &FlattenContext) -> Result<Vec<FlatRecord>, ShapeViolation> {
    let violation = |field: &str, reason: String| ShapeViolation {
        field: field.to_string(),
        reason,
        raw: item.clone(),
    };

    let obj = item
        .as_object()
        .ok_or_else(|| violation("", format!("expected an object, got {}", json_type(item))))?;

    let tag = obj.get("resource").and_then(Value::as_str);
    let tagged = tag.and_then(ResourceKind::from_upstream_tag);
    if let (Some(tag), None) = (tag, tagged) {
        warn!(tag, fallback = ?ctx.default_kind, "unrecognised resource tag");
    }
    let kind = tagged
        .or(ctx.default_kind)
        .ok_or_else(|| violation("resource", format!("cannot determine resource kind (tag={tag:?})")))?;
    let shape = kind.shape();
    let own_id = obj.get("id").filter(|v| !v.is_null()).map(render_id);

    let mut record = FlatRecord::new(kind, item.clone());
    let mut siblings: Vec<FlatRecord> = Vec::new();

    for (field, value) in obj {
        match value {
            Value::Object(nested) if field == "limits" && kind == ResourceKind::PaymentMethod => {
                siblings.extend(explode_limits(nested, own_id.as_deref()).map_err(|(f, r)| violation(&f, r))?);
            }
            Value::Array(list) if field == "fees" && kind == ResourceKind::Exchange => {
                siblings.extend(explode_fees(list, own_id.as_deref()).map_err(|(f, r)| violation(&f, r))?);
            }
            _ => absorb(&mut record, shape, field, value).map_err(|(f, r)| violation(&f, r))?,
        }
    }

    if let Some(parent) = &ctx.parent {
        if let Some(fk) = parent.kind.foreign_key() {
            let unset = record.get(fk).map_or(true, FieldValue::is_null);
            if shape.contains(fk) && unset {
                record.set(fk, FieldValue::Text(parent.id.clone()));
            }
        }
    }

    if !siblings.is_empty() {
        debug!(kind = %kind, id = ?own_id, siblings = siblings.len(), "document fanned out");
    }
    let mut out = Vec::with_capacity(1 + siblings.len());
    out.push(record);
    out.extend(siblings);
    Ok(out)
}

type FieldFault = (String, String);

/// Merge one field into `record`, recursing into nested objects.
fn absorb(record: &mut FlatRecord, shape: &Shape, name: &str, value: &Value) -> Result<(), FieldFault> {
    let declared_document = shape.field(name).map(|s| s.ty) == Some(FieldType::Document);
    match value {
        Value::Object(_) | Value::Array(_) if declared_document => {
            record.set(name, FieldValue::Document(value.clone()));
        }
        Value::Object(nested) => {
            for (sub, sub_value) in nested {
                let merged = if sub == "amount" {
                    name.to_string()
                } else {
                    format!("{name}_{sub}")
                };
                absorb(record, shape, &merged, sub_value)?;
            }
        }
        Value::Array(_) => {
            return Err((name.to_string(), "unsupported list field".to_string()));
        }
        scalar => record.set(name, FieldValue::from_json(scalar)),
    }
    Ok(())
}

fn explode_limits(
    limits: &Map<String, Value>,
    payment_method_id: Option<&str>,
) -> Result<Vec<FlatRecord>, FieldFault> {
    let shape = ResourceKind::Limit.shape();
    let mut out = Vec::new();
    for (limit_type, entries) in limits {
        let path = format!("limits.{limit_type}");
        let list = match entries {
            Value::Array(list) => list,
            Value::Object(_) => return Err((path, "expected a list of limits".to_string())),
            // Descriptors of the payment method itself (e.g. `name`).
            _ => continue,
        };
        for entry in list {
            let obj = entry
                .as_object()
                .ok_or_else(|| (path.clone(), format!("limit entry is {}", json_type(entry))))?;
            let mut rec = FlatRecord::new(ResourceKind::Limit, entry.clone());
            for (field, value) in obj {
                absorb(&mut rec, shape, field, value).map_err(|(f, r)| (format!("{path}.{f}"), r))?;
            }
            rec.set("type", FieldValue::Text(limit_type.clone()));
            rec.set("payment_method_id", optional_text(payment_method_id));
            out.push(rec);
        }
    }
    Ok(out)
}

fn explode_fees(fees: &[Value], source_id: Option<&str>) -> Result<Vec<FlatRecord>, FieldFault> {
    let shape = ResourceKind::Fee.shape();
    let mut out = Vec::with_capacity(fees.len());
    for (i, entry) in fees.iter().enumerate() {
        let path = format!("fees.{i}");
        let obj = entry
            .as_object()
            .ok_or_else(|| (path.clone(), format!("fee entry is {}", json_type(entry))))?;
        let mut rec = FlatRecord::new(ResourceKind::Fee, entry.clone());
        for (field, value) in obj {
            absorb(&mut rec, shape, field, value).map_err(|(f, r)| (format!("{path}.{f}"), r))?;
        }
        rec.set("source_id", optional_text(source_id));
        out.push(rec);
    }
    Ok(out)
}

fn optional_text(s: Option<&str>) -> FieldValue {
    s.map_or(FieldValue::Null, |s| FieldValue::Text(s.to_string()))
}

fn render_id(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn amount_subfield_is_hoisted_and_siblings_prefixed() {
        let doc = json!({
            "id": "acct-1",
            "resource": "account",
            "balance": {"amount": "1.00", "currency": "BTC"},
            "country": {"code": "US", "name": "United States"}
        });
        let out = flatten(&doc, &FlattenContext::default()).unwrap();
        assert_eq!(out.len(), 1);
        let r = &out[0];
        assert_eq!(r.kind, ResourceKind::Account);
        assert_eq!(r.get("balance"), Some(&text("1.00")));
        assert_eq!(r.get("balance_currency"), Some(&text("BTC")));
        assert_eq!(r.get("country_code"), Some(&text("US")));
        assert!(r.get("country").is_none());
        assert_eq!(r.raw, doc);
    }

    #[test]
    fn data_envelope_is_unwrapped() {
        let page = json!({
            "pagination": {"next_uri": null},
            "data": [
                {"id": "a", "resource": "address", "address": "1A"},
                {"id": "b", "resource": "address", "address": "1B"}
            ]
        });
        let out = flatten(&page, &FlattenContext::default()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].id().as_deref(), Some("b"));

        let single = json!({"data": {"id": "u", "resource": "user"}});
        let out = flatten(&single, &FlattenContext::default()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ResourceKind::User);
    }

    #[test]
    fn limits_fan_out_into_sibling_records() {
        let doc = json!({
            "id": "pm-1",
            "resource": "payment_method",
            "type": "ach_bank_account",
            "limits": {
                "type": "bank",
                "name": "Bank Account",
                "sell": [{"period_in_days": 7, "total": {"amount": "3000.00", "currency": "USD"}}],
                "buy": [{"period_in_days": 7, "total": {"amount": "3000.00", "currency": "USD"}}]
            }
        });
        let out = flatten(&doc, &FlattenContext::default()).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind, ResourceKind::PaymentMethod);
        assert!(out[0].get("limits").is_none());

        let mut types: Vec<String> = Vec::new();
        for limit in &out[1..] {
            assert_eq!(limit.kind, ResourceKind::Limit);
            assert_eq!(limit.get("payment_method_id"), Some(&text("pm-1")));
            assert_eq!(limit.get("total"), Some(&text("3000.00")));
            types.push(limit.get("type").unwrap().render());
        }
        // Document order, not key order.
        assert_eq!(types, vec!["sell", "buy"]);
    }

    #[test]
    fn raw_document_keeps_upstream_key_order() {
        let doc = json!({"id": "t-1", "resource": "transaction", "amount": {"amount": "1.0", "currency": "BTC"}});
        let out = flatten(&doc, &FlattenContext::default()).unwrap();
        let raw = serde_json::to_string(&out[0].raw).unwrap();
        assert!(raw.starts_with(r#"{"id":"t-1","resource":"transaction""#), "{raw}");
    }

    #[test]
    fn fees_fan_out_with_source_id() {
        let doc = json!({
            "id": "buy-1",
            "resource": "buy",
            "fees": [
                {"type": "coinbase", "amount": {"amount": "1.49", "currency": "USD"}},
                {"type": "bank", "amount": {"amount": "0.15", "currency": "USD"}}
            ]
        });
        let out = flatten(&doc, &FlattenContext::default()).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind, ResourceKind::Exchange);
        assert_eq!(out[0].get("resource"), Some(&text("buy")));
        assert_eq!(out[1].kind, ResourceKind::Fee);
        assert_eq!(out[1].get("source_id"), Some(&text("buy-1")));
        assert_eq!(out[1].get("type"), Some(&text("coinbase")));
        assert_eq!(out[2].get("amount"), Some(&text("0.15")));
    }

    #[test]
    fn unknown_list_is_a_shape_violation() {
        let doc = json!({"id": "t-1", "resource": "transaction", "tags": ["a", "b"]});
        let err = flatten(&doc, &FlattenContext::default()).unwrap_err();
        assert_eq!(err.field, "tags");
        assert_eq!(err.raw, doc);
    }

    #[test]
    fn violation_in_one_element_does_not_hide_the_others() {
        let page = json!({"data": [
            {"id": "a", "resource": "address"},
            {"id": "b", "resource": "address", "bad": [1]}
        ]});
        let results = flatten_each(&page, &FlattenContext::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn parent_id_fills_foreign_key_and_default_kind_applies() {
        let doc = json!({"id": "h-1", "amount": "4.00", "type": "order", "ref": "o-1"});
        let ctx = FlattenContext::of(ResourceKind::Hold).with_parent(ResourceKind::Account, "acct-9");
        let out = flatten(&doc, &ctx).unwrap();
        assert_eq!(out[0].kind, ResourceKind::Hold);
        assert_eq!(out[0].get("account_id"), Some(&text("acct-9")));
    }

    #[test]
    fn unrecognised_tag_falls_back_to_collection_kind() {
        let doc = json!({"id": "t-7", "resource": "vault_transfer", "status": "completed"});
        let out = flatten(&doc, &FlattenContext::of(ResourceKind::Transaction)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ResourceKind::Transaction);
        assert_eq!(out[0].get("resource"), Some(&text("vault_transfer")));

        let err = flatten(&doc, &FlattenContext::default()).unwrap_err();
        assert!(err.reason.contains("vault_transfer"), "{err}");
    }

    #[test]
    fn document_without_kind_is_rejected() {
        let doc = json!({"id": "x"});
        let err = flatten(&doc, &FlattenContext::default()).unwrap_err();
        assert_eq!(err.field, "resource");
    }

    #[test]
    fn nested_of_nested_flattens_recursively() {
        let doc = json!({
            "id": "t-1",
            "resource": "transaction",
            "network": {"status": "confirmed", "transaction_fee": {"amount": "0.0001", "currency": "BTC"}}
        });
        let out = flatten(&doc, &FlattenContext::default()).unwrap();
        assert_eq!(out[0].get("network_status"), Some(&text("confirmed")));
        assert_eq!(out[0].get("network_transaction_fee"), Some(&text("0.0001")));
        assert_eq!(
            out[0].get("network_transaction_fee_currency"),
            Some(&text("BTC"))
        );
    }

    #[test]
    fn declared_document_fields_are_kept_whole() {
        let doc = json!({"id": "u-1", "resource": "user", "restrictions": ["a"], "tiers": {"level": 2}});
        let out = flatten(&doc, &FlattenContext::default()).unwrap();
        assert_eq!(out[0].get("restrictions"), Some(&FieldValue::Document(json!(["a"]))));
        assert_eq!(out[0].get("tiers"), Some(&FieldValue::Document(json!({"level": 2}))));
    }
}
