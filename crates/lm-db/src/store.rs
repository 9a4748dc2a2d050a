//! Postgres implementation of the reconciliation [`Store`].
//!
//! SQL is built per kind from the shape registry. Values are bound as text
//! and cast to the declared column type, so one code path serves every
//! table. `ON CONFLICT DO NOTHING RETURNING` is the uniqueness signal: no
//! returned row means the natural key already exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lm_reconcile::{InsertResult, NewReconciliationException, Store, StoreError, StoredRecord};
use lm_schemas::{FieldSpec, FieldType, FieldValue, MappedRecord, NaturalKey, ResourceKind};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// One database transaction per `begin`/`commit` pair.
pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("no open transaction".to_string()))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Text form bound for a value; the SQL casts it to the column type.
fn bind_text(v: &FieldValue) -> Option<String> {
    match v {
        FieldValue::Null => None,
        other => Some(other.render()),
    }
}

fn cast(idx: usize, ty: FieldType) -> String {
    format!("${idx}::text::{}", ty.sql_type())
}

pub(crate) fn insert_sql(record: &MappedRecord) -> (String, Vec<Option<String>>) {
    let shape = record.kind.shape();
    let mut columns = Vec::new();
    let mut params = Vec::new();
    let mut binds = Vec::new();
    for spec in shape.fields {
        let Some(v) = record.fields.get(spec.name) else {
            continue;
        };
        binds.push(bind_text(v));
        columns.push(quote_ident(spec.name));
        params.push(cast(binds.len(), spec.ty));
    }
    let sql = format!(
        "insert into {} ({}) values ({}) on conflict do nothing returning 1",
        record.kind.table_name(),
        columns.join(", "),
        params.join(", ")
    );
    (sql, binds)
}

pub(crate) fn select_by_key_sql(kind: ResourceKind, key: &NaturalKey) -> (String, Vec<Option<String>>) {
    let shape = kind.shape();
    let columns: Vec<String> = shape.fields.iter().map(|s| quote_ident(s.name)).collect();
    let mut predicates = Vec::new();
    let mut binds = Vec::new();
    for (name, value) in &key.parts {
        let ty = shape.field(name).map(|s| s.ty).unwrap_or(FieldType::Text);
        binds.push(bind_text(value));
        predicates.push(format!(
            "{} is not distinct from {}",
            quote_ident(name),
            cast(binds.len(), ty)
        ));
    }
    let sql = format!(
        "select {} from {} where {}",
        columns.join(", "),
        kind.table_name(),
        predicates.join(" and ")
    );
    (sql, binds)
}

fn decode_field(row: &PgRow, spec: &FieldSpec) -> Result<FieldValue, sqlx::Error> {
    let name = spec.name;
    let value = match spec.ty {
        FieldType::Text => row.try_get::<Option<String>, _>(name)?.map(FieldValue::Text),
        FieldType::Numeric => row.try_get::<Option<Decimal>, _>(name)?.map(FieldValue::Number),
        FieldType::Integer => row.try_get::<Option<i64>, _>(name)?.map(FieldValue::Integer),
        FieldType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(FieldValue::Bool),
        FieldType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(name)?
            .map(FieldValue::Timestamp),
        FieldType::Document => row.try_get::<Option<Value>, _>(name)?.map(FieldValue::Document),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

fn decode_record(kind: ResourceKind, row: &PgRow) -> Result<StoredRecord, sqlx::Error> {
    let mut fields = std::collections::BTreeMap::new();
    for spec in kind.shape().fields {
        let v = decode_field(row, spec)?;
        if !v.is_null() {
            fields.insert(spec.name, v);
        }
    }
    Ok(StoredRecord { kind, fields })
}

/// Data and integrity-constraint errors (SQLSTATE classes 22 and 23) are
/// refusals of this record; anything else means the store itself is in trouble.
pub(crate) fn store_error(op: &str, e: sqlx::Error) -> StoreError {
    let rejected = match &e {
        sqlx::Error::Database(db) => db
            .code()
            .as_deref()
            .is_some_and(|c| c.starts_with("22") || c.starts_with("23")),
        sqlx::Error::ColumnDecode { .. } => true,
        _ => false,
    };
    if rejected {
        StoreError::Rejected(format!("{op}: {e}"))
    } else {
        StoreError::Unavailable(format!("{op}: {e}"))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.tx.is_some() {
            return Err(StoreError::Unavailable(
                "transaction already open".to_string(),
            ));
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("begin", e))?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(|e| store_error("commit", e)),
            None => Err(StoreError::Unavailable("no open transaction".to_string())),
        }
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(|e| store_error("rollback", e)),
            None => Ok(()),
        }
    }

    async fn insert_record(&mut self, record: &MappedRecord) -> Result<InsertResult, StoreError> {
        let (sql, binds) = insert_sql(record);
        let tx = self.tx()?;
        let mut q = sqlx::query(&sql);
        for b in binds {
            q = q.bind(b);
        }
        let row = q
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| store_error("insert_record", e))?;
        Ok(if row.is_some() {
            InsertResult::Inserted
        } else {
            InsertResult::Conflict
        })
    }

    async fn load_by_key(
        &mut self,
        kind: ResourceKind,
        key: &NaturalKey,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let (sql, binds) = select_by_key_sql(kind, key);
        let tx = self.tx()?;
        let mut q = sqlx::query(&sql);
        for b in binds {
            q = q.bind(b);
        }
        let rows = q
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| store_error("load_by_key", e))?;
        rows.iter()
            .map(|r| decode_record(kind, r).map_err(|e| store_error("load_by_key decode", e)))
            .collect()
    }

    async fn insert_exception(
        &mut self,
        exception: &NewReconciliationException,
    ) -> Result<InsertResult, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"
            insert into reconciliation_exceptions (
              resource, record_key, field_name, stored_value, incoming_value,
              stored_kind, incoming_kind, json_doc, detected_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9
            )
            on conflict (resource, record_key, field_name) where not resolved do nothing
            returning id
            "#,
        )
        .bind(exception.resource.as_str())
        .bind(&exception.record_key)
        .bind(exception.field_name)
        .bind(exception.stored_value.to_json())
        .bind(exception.incoming_value.to_json())
        .bind(exception.stored_kind().as_str())
        .bind(exception.incoming_kind().as_str())
        .bind(exception.json_doc())
        .bind(exception.detected_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| store_error("insert_exception", e))?;

        Ok(if row.is_some() {
            InsertResult::Inserted
        } else {
            InsertResult::Conflict
        })
    }
}
