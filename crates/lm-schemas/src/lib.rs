//! lm-schemas
//!
//! Data model of the ledger mirror and the Resource Mapper.
//!
//! - [`ResourceKind`]: closed tag of every mirrored resource.
//! - [`Shape`]: statically declared field set + natural key per kind.
//! - [`FlatRecord`] / [`MappedRecord`]: denested rows before and after typing.
//!
//! Pure lookup tables and conversions. No IO.

mod kind;
mod record;
mod shape;
mod value;

pub use kind::ResourceKind;
pub use record::{map_record, FlatRecord, MapError, MappedRecord, NaturalKey, KEY_SEPARATOR};
pub use shape::{shape_of, FieldSpec, Shape, DOCUMENT_FIELD};
pub use value::{
    parse_decimal, parse_timestamp, FieldType, FieldValue, ValueKind, TIMESTAMP_FORMATS,
};
