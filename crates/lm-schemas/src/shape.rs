//! Statically declared schema registry: one [`Shape`] per resource kind.
//!
//! Field names are the denested names (`{field}_{subfield}`, hoisted
//! `amount`). A flat-record field absent from its kind's shape is schema
//! drift.

use crate::kind::ResourceKind;
use crate::value::FieldType::{self, Boolean, Document, Integer, Numeric, Text, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

const fn f(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { name, ty }
}

#[derive(Debug)]
pub struct Shape {
    pub kind: ResourceKind,
    pub fields: &'static [FieldSpec],
    pub natural_key: &'static [&'static str],
}

impl Shape {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn is_key_field(&self, name: &str) -> bool {
        self.natural_key.contains(&name)
    }

    /// Fields compared on conflict: everything except the natural key.
    pub fn compared_fields(&self) -> impl Iterator<Item = &'static FieldSpec> + '_ {
        self.fields.iter().filter(|s| !self.is_key_field(s.name))
    }
}

/// Field name carrying the raw upstream object for audit.
pub const DOCUMENT_FIELD: &str = "document";

pub fn shape_of(kind: ResourceKind) -> &'static Shape {
    match kind {
        ResourceKind::User => &USER,
        ResourceKind::Account => &ACCOUNT,
        ResourceKind::Address => &ADDRESS,
        ResourceKind::Transaction => &TRANSACTION,
        ResourceKind::Exchange => &EXCHANGE,
        ResourceKind::Fee => &FEE,
        ResourceKind::PaymentMethod => &PAYMENT_METHOD,
        ResourceKind::Limit => &LIMIT,
        ResourceKind::Order => &ORDER,
        ResourceKind::Fill => &FILL,
        ResourceKind::Hold => &HOLD,
        ResourceKind::LedgerEntry => &LEDGER_ENTRY,
        ResourceKind::Exception => &EXCEPTION,
    }
}

const ID_KEY: &[&str] = &["id"];

static USER: Shape = Shape {
    kind: ResourceKind::User,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("name", Text),
        f("username", Text),
        f("profile_location", Text),
        f("profile_bio", Text),
        f("profile_url", Text),
        f("avatar_url", Text),
        f("time_zone", Text),
        f("native_currency", Text),
        f("bitcoin_unit", Text),
        f("state", Text),
        f("country_code", Text),
        f("country_name", Text),
        f("email", Text),
        f("tiers", Document),
        f("restrictions", Document),
        f("created_at", Timestamp),
        f("document", Document),
    ],
};

static ACCOUNT: Shape = Shape {
    kind: ResourceKind::Account,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("user_id", Text),
        f("profile_id", Text),
        f("name", Text),
        f("primary", Boolean),
        f("type", Text),
        f("currency", Text),
        f("currency_code", Text),
        f("currency_name", Text),
        f("balance", Numeric),
        f("balance_currency", Text),
        f("native_balance", Numeric),
        f("native_balance_currency", Text),
        f("hold", Numeric),
        f("available", Numeric),
        f("trading_enabled", Boolean),
        f("allow_deposits", Boolean),
        f("allow_withdrawals", Boolean),
        f("created_at", Timestamp),
        f("updated_at", Timestamp),
        f("document", Document),
    ],
};

static ADDRESS: Shape = Shape {
    kind: ResourceKind::Address,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("account_id", Text),
        f("address", Text),
        f("name", Text),
        f("network", Text),
        f("callback_url", Text),
        f("created_at", Timestamp),
        f("updated_at", Timestamp),
        f("document", Document),
    ],
};

static TRANSACTION: Shape = Shape {
    kind: ResourceKind::Transaction,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("account_id", Text),
        f("type", Text),
        f("status", Text),
        f("amount", Numeric),
        f("amount_currency", Text),
        f("native_amount", Numeric),
        f("native_amount_currency", Text),
        f("description", Text),
        f("instant_exchange", Boolean),
        f("idem", Text),
        f("details_title", Text),
        f("details_subtitle", Text),
        f("network_status", Text),
        f("network_hash", Text),
        f("network_name", Text),
        f("network_transaction_fee", Numeric),
        f("network_transaction_fee_currency", Text),
        f("to_id", Text),
        f("to_resource", Text),
        f("to_address", Text),
        f("to_email", Text),
        f("from_id", Text),
        f("from_resource", Text),
        f("address_id", Text),
        f("application_id", Text),
        f("buy_id", Text),
        f("sell_id", Text),
        f("fiat_deposit_id", Text),
        f("fiat_withdrawal_id", Text),
        f("created_at", Timestamp),
        f("updated_at", Timestamp),
        f("document", Document),
    ],
};

static EXCHANGE: Shape = Shape {
    kind: ResourceKind::Exchange,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("account_id", Text),
        f("resource", Text),
        f("status", Text),
        f("payment_method_id", Text),
        f("payment_method_resource", Text),
        f("transaction_id", Text),
        f("transaction_resource", Text),
        f("amount", Numeric),
        f("amount_currency", Text),
        f("total", Numeric),
        f("total_currency", Text),
        f("subtotal", Numeric),
        f("subtotal_currency", Text),
        f("fee", Numeric),
        f("fee_currency", Text),
        f("unit_price", Numeric),
        f("unit_price_currency", Text),
        f("committed", Boolean),
        f("instant", Boolean),
        f("is_first_buy", Boolean),
        f("requires_completion_step", Boolean),
        f("hold_days", Integer),
        f("hold_until", Timestamp),
        f("payout_at", Timestamp),
        f("created_at", Timestamp),
        f("updated_at", Timestamp),
        f("document", Document),
    ],
};

static FEE: Shape = Shape {
    kind: ResourceKind::Fee,
    natural_key: &["source_id", "type"],
    fields: &[
        f("source_id", Text),
        f("type", Text),
        f("amount", Numeric),
        f("amount_currency", Text),
        f("document", Document),
    ],
};

static PAYMENT_METHOD: Shape = Shape {
    kind: ResourceKind::PaymentMethod,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("type", Text),
        f("name", Text),
        f("currency", Text),
        f("primary_buy", Boolean),
        f("primary_sell", Boolean),
        f("allow_buy", Boolean),
        f("allow_sell", Boolean),
        f("allow_deposit", Boolean),
        f("allow_withdraw", Boolean),
        f("instant_buy", Boolean),
        f("instant_sell", Boolean),
        f("verified", Boolean),
        f("fiat_account_id", Text),
        f("fiat_account_resource", Text),
        f("minimum_purchase_amount", Numeric),
        f("minimum_purchase_amount_currency", Text),
        f("created_at", Timestamp),
        f("updated_at", Timestamp),
        f("document", Document),
    ],
};

static LIMIT: Shape = Shape {
    kind: ResourceKind::Limit,
    natural_key: &["payment_method_id", "type", "period_in_days"],
    fields: &[
        f("payment_method_id", Text),
        f("type", Text),
        f("period_in_days", Integer),
        f("total", Numeric),
        f("total_currency", Text),
        f("remaining", Numeric),
        f("remaining_currency", Text),
        f("description", Text),
        f("label", Text),
        f("document", Document),
    ],
};

static ORDER: Shape = Shape {
    kind: ResourceKind::Order,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("product_id", Text),
        f("side", Text),
        f("type", Text),
        f("status", Text),
        f("price", Numeric),
        f("size", Numeric),
        f("funds", Numeric),
        f("specified_funds", Numeric),
        f("filled_size", Numeric),
        f("fill_fees", Numeric),
        f("executed_value", Numeric),
        f("time_in_force", Text),
        f("stp", Text),
        f("post_only", Boolean),
        f("settled", Boolean),
        f("done_reason", Text),
        f("done_at", Timestamp),
        f("created_at", Timestamp),
        f("document", Document),
    ],
};

static FILL: Shape = Shape {
    kind: ResourceKind::Fill,
    natural_key: &["trade_id", "created_at", "account_id"],
    fields: &[
        f("trade_id", Integer),
        f("created_at", Timestamp),
        f("account_id", Text),
        f("product_id", Text),
        f("order_id", Text),
        f("price", Numeric),
        f("size", Numeric),
        f("fee", Numeric),
        f("usd_volume", Numeric),
        f("liquidity", Text),
        f("side", Text),
        f("settled", Boolean),
        f("document", Document),
    ],
};

static HOLD: Shape = Shape {
    kind: ResourceKind::Hold,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("account_id", Text),
        f("amount", Numeric),
        f("type", Text),
        f("ref", Text),
        f("created_at", Timestamp),
        f("updated_at", Timestamp),
        f("document", Document),
    ],
};

static LEDGER_ENTRY: Shape = Shape {
    kind: ResourceKind::LedgerEntry,
    natural_key: ID_KEY,
    fields: &[
        f("id", Text),
        f("account_id", Text),
        f("amount", Numeric),
        f("balance", Numeric),
        f("type", Text),
        f("details_order_id", Text),
        f("details_trade_id", Text),
        f("details_product_id", Text),
        f("details_transfer_id", Text),
        f("details_transfer_type", Text),
        f("created_at", Timestamp),
        f("document", Document),
    ],
};

static EXCEPTION: Shape = Shape {
    kind: ResourceKind::Exception,
    natural_key: &["resource", "record_key", "field_name"],
    fields: &[
        f("resource", Text),
        f("record_key", Text),
        f("field_name", Text),
        f("stored_value", Document),
        f("incoming_value", Document),
        f("stored_kind", Text),
        f("incoming_kind", Text),
        f("json_doc", Boolean),
        f("resolved", Boolean),
        f("resolution", Text),
        f("detected_at", Timestamp),
        f("resolved_at", Timestamp),
    ],
};
