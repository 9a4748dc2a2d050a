//! Collection plan: which upstream collections are walked, in what order,
//! and which parent each walk hangs off.

use anyhow::{bail, Result};
use lm_denest::ParentRef;
use lm_schemas::ResourceKind;
use lm_source::PageRequest;
use serde::Serialize;

/// Placeholder replaced by the owning account id in paths and query values.
pub const ACCOUNT_PLACEHOLDER: &str = "{account_id}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Api {
    Wallet,
    Exchange,
}

impl Api {
    pub fn as_str(&self) -> &'static str {
        match self {
            Api::Wallet => "wallet",
            Api::Exchange => "exchange",
        }
    }
}

/// Parent a walk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// One walk, no parent.
    None,
    /// One walk, parented to the user when one was discovered.
    User,
    /// One walk per wallet account discovered earlier in the run.
    WalletAccount,
    /// One walk per exchange account discovered earlier in the run.
    ExchangeAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    pub name: &'static str,
    pub api: Api,
    /// Kind assumed for documents without a `resource` tag.
    pub kind: ResourceKind,
    pub path: &'static str,
    pub query: &'static [(&'static str, &'static str)],
    pub owner: Owner,
    /// Parent ids this collection yields for later collections.
    pub discovers: Option<Owner>,
}

impl Collection {
    pub fn request_for(&self, account_id: Option<&str>) -> PageRequest {
        let fill = |s: &str| match account_id {
            Some(id) => s.replace(ACCOUNT_PLACEHOLDER, id),
            None => s.to_string(),
        };
        PageRequest::new(fill(self.path)).with_query(
            self.query
                .iter()
                .map(|(k, v)| (k.to_string(), fill(v)))
                .collect(),
        )
    }

    /// Parent reference handed to the Denester for a walk under `id`.
    pub fn parent_ref(&self, id: &str) -> Option<ParentRef> {
        let kind = match self.owner {
            Owner::None => return None,
            Owner::User => ResourceKind::User,
            Owner::WalletAccount | Owner::ExchangeAccount => ResourceKind::Account,
        };
        Some(ParentRef {
            kind,
            id: id.to_string(),
        })
    }
}

const fn c(
    name: &'static str,
    api: Api,
    kind: ResourceKind,
    path: &'static str,
    owner: Owner,
) -> Collection {
    Collection {
        name,
        api,
        kind,
        path,
        query: &[],
        owner,
        discovers: None,
    }
}

/// Every collection in dependency order: parents before the collections
/// that reference them.
pub const DEFAULT_PLAN: &[Collection] = &[
    Collection {
        discovers: Some(Owner::User),
        ..c("user", Api::Wallet, ResourceKind::User, "/v2/user", Owner::None)
    },
    Collection {
        discovers: Some(Owner::WalletAccount),
        ..c("accounts", Api::Wallet, ResourceKind::Account, "/v2/accounts", Owner::User)
    },
    Collection {
        discovers: Some(Owner::ExchangeAccount),
        ..c("exchange_accounts", Api::Exchange, ResourceKind::Account, "/accounts", Owner::None)
    },
    c(
        "payment_methods",
        Api::Wallet,
        ResourceKind::PaymentMethod,
        "/v2/payment-methods",
        Owner::None,
    ),
    c(
        "addresses",
        Api::Wallet,
        ResourceKind::Address,
        "/v2/accounts/{account_id}/addresses",
        Owner::WalletAccount,
    ),
    Collection {
        query: &[("account_id", ACCOUNT_PLACEHOLDER)],
        ..c("fills", Api::Exchange, ResourceKind::Fill, "/fills", Owner::ExchangeAccount)
    },
    c(
        "holds",
        Api::Exchange,
        ResourceKind::Hold,
        "/accounts/{account_id}/holds",
        Owner::ExchangeAccount,
    ),
    c(
        "ledger",
        Api::Exchange,
        ResourceKind::LedgerEntry,
        "/accounts/{account_id}/ledger",
        Owner::ExchangeAccount,
    ),
    Collection {
        query: &[("status", "all")],
        ..c("orders", Api::Exchange, ResourceKind::Order, "/orders", Owner::None)
    },
    c(
        "buys",
        Api::Wallet,
        ResourceKind::Exchange,
        "/v2/accounts/{account_id}/buys",
        Owner::WalletAccount,
    ),
    c(
        "sells",
        Api::Wallet,
        ResourceKind::Exchange,
        "/v2/accounts/{account_id}/sells",
        Owner::WalletAccount,
    ),
    c(
        "deposits",
        Api::Wallet,
        ResourceKind::Exchange,
        "/v2/accounts/{account_id}/deposits",
        Owner::WalletAccount,
    ),
    c(
        "withdrawals",
        Api::Wallet,
        ResourceKind::Exchange,
        "/v2/accounts/{account_id}/withdrawals",
        Owner::WalletAccount,
    ),
    c(
        "transactions",
        Api::Wallet,
        ResourceKind::Transaction,
        "/v2/accounts/{account_id}/transactions",
        Owner::WalletAccount,
    ),
];

/// An ordered subset of [`DEFAULT_PLAN`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    collections: Vec<Collection>,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            collections: DEFAULT_PLAN.to_vec(),
        }
    }
}

impl Plan {
    pub fn find(name: &str) -> Option<&'static Collection> {
        let wanted = name.trim().to_ascii_lowercase().replace('-', "_");
        DEFAULT_PLAN.iter().find(|c| c.name == wanted)
    }

    /// Restrict the plan to `names`, always in plan order.
    ///
    /// Per-account collections pull in the collection that discovers their
    /// accounts; without it they would have nothing to walk.
    pub fn select<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut wanted: Vec<&'static str> = Vec::new();
        for name in names {
            let Some(col) = Self::find(name.as_ref()) else {
                bail!(
                    "unknown collection '{}'; known: {}",
                    name.as_ref(),
                    DEFAULT_PLAN.iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
                );
            };
            wanted.push(col.name);
            let required = match col.owner {
                Owner::WalletAccount => Some("accounts"),
                Owner::ExchangeAccount => Some("exchange_accounts"),
                Owner::None | Owner::User => None,
            };
            if let Some(req) = required {
                if !wanted.contains(&req) {
                    tracing::info!(collection = col.name, required = req, "adding parent collection to plan");
                    wanted.push(req);
                }
            }
        }
        Ok(Self {
            collections: DEFAULT_PLAN
                .iter()
                .filter(|c| wanted.contains(&c.name))
                .copied()
                .collect(),
        })
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.collections.iter().map(|c| c.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_puts_parents_first() {
        let names = Plan::default().names();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert_eq!(names[0], "user");
        assert!(pos("accounts") < pos("addresses"));
        assert!(pos("exchange_accounts") < pos("fills"));
        assert!(pos("payment_methods") < pos("buys"));
        assert!(pos("orders") < pos("buys"));
        assert_eq!(*names.last().unwrap(), "transactions");
    }

    #[test]
    fn selection_keeps_plan_order_and_adds_parents() {
        let plan = Plan::select(&["transactions", "holds", "user"]).unwrap();
        assert_eq!(
            plan.names(),
            vec!["user", "accounts", "exchange_accounts", "holds", "transactions"]
        );
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let err = Plan::select(&["trades"]).unwrap_err();
        assert!(err.to_string().contains("unknown collection 'trades'"));
    }

    #[test]
    fn requests_substitute_the_account() {
        let fills = Plan::find("fills").unwrap();
        let req = fills.request_for(Some("ex-1"));
        assert_eq!(req.path, "/fills");
        assert_eq!(req.query, vec![("account_id".to_string(), "ex-1".to_string())]);

        let addresses = Plan::find("Addresses").unwrap();
        assert_eq!(addresses.request_for(Some("a-1")).path, "/v2/accounts/a-1/addresses");
    }
}
