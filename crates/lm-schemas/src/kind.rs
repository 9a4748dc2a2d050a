use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::shape::{self, Shape};

/// Closed set of resource kinds mirrored from upstream.
///
/// Every flat record carries exactly one kind; all mapper lookups dispatch on
/// this enum rather than on upstream `resource` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    User,
    Account,
    Address,
    Transaction,
    Exchange,
    Fee,
    PaymentMethod,
    Limit,
    Order,
    Fill,
    Hold,
    LedgerEntry,
    Exception,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 13] = [
        ResourceKind::User,
        ResourceKind::Account,
        ResourceKind::Address,
        ResourceKind::Transaction,
        ResourceKind::Exchange,
        ResourceKind::Fee,
        ResourceKind::PaymentMethod,
        ResourceKind::Limit,
        ResourceKind::Order,
        ResourceKind::Fill,
        ResourceKind::Hold,
        ResourceKind::LedgerEntry,
        ResourceKind::Exception,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Account => "account",
            ResourceKind::Address => "address",
            ResourceKind::Transaction => "transaction",
            ResourceKind::Exchange => "exchange",
            ResourceKind::Fee => "fee",
            ResourceKind::PaymentMethod => "payment_method",
            ResourceKind::Limit => "limit",
            ResourceKind::Order => "order",
            ResourceKind::Fill => "fill",
            ResourceKind::Hold => "hold",
            ResourceKind::LedgerEntry => "ledger_entry",
            ResourceKind::Exception => "exception",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == norm)
            .ok_or_else(|| {
                anyhow!(
                    "invalid resource kind '{}'. expected one of: {}",
                    s,
                    ResourceKind::ALL
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(" | ")
                )
            })
    }

    /// Map an upstream `resource` tag to a kind.
    ///
    /// Buys, sells, deposits and withdrawals all land in the exchange table;
    /// the original tag survives in the exchange's own `resource` column.
    pub fn from_upstream_tag(tag: &str) -> Option<Self> {
        match tag {
            "user" => Some(ResourceKind::User),
            "account" => Some(ResourceKind::Account),
            "address" => Some(ResourceKind::Address),
            "transaction" => Some(ResourceKind::Transaction),
            "buy" | "sell" | "deposit" | "withdrawal" | "fiat_deposit" | "fiat_withdrawal" => {
                Some(ResourceKind::Exchange)
            }
            "fee" => Some(ResourceKind::Fee),
            "payment_method" => Some(ResourceKind::PaymentMethod),
            "limit" => Some(ResourceKind::Limit),
            "order" => Some(ResourceKind::Order),
            "fill" => Some(ResourceKind::Fill),
            "hold" => Some(ResourceKind::Hold),
            "entry" | "ledger_entry" => Some(ResourceKind::LedgerEntry),
            _ => None,
        }
    }

    /// Destination table in the relational store.
    pub fn table_name(&self) -> &'static str {
        match self {
            ResourceKind::User => "users",
            ResourceKind::Account => "accounts",
            ResourceKind::Address => "addresses",
            ResourceKind::Transaction => "transactions",
            ResourceKind::Exchange => "exchanges",
            ResourceKind::Fee => "fees",
            ResourceKind::PaymentMethod => "payment_methods",
            ResourceKind::Limit => "limits",
            ResourceKind::Order => "orders",
            ResourceKind::Fill => "fills",
            ResourceKind::Hold => "holds",
            ResourceKind::LedgerEntry => "ledger_entries",
            ResourceKind::Exception => "reconciliation_exceptions",
        }
    }

    /// Column a child record uses to reference a parent of this kind.
    pub fn foreign_key(&self) -> Option<&'static str> {
        match self {
            ResourceKind::User => Some("user_id"),
            ResourceKind::Account => Some("account_id"),
            ResourceKind::PaymentMethod => Some("payment_method_id"),
            _ => None,
        }
    }

    pub fn shape(&self) -> &'static Shape {
        shape::shape_of(*self)
    }

    /// Ordered natural-key field list (length 1..=3).
    pub fn natural_key(&self) -> &'static [&'static str] {
        self.shape().natural_key
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
