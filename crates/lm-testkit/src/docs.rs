//! Canned upstream documents.
//!
//! Shapes follow the live payloads closely enough to exercise every
//! denesting rule: hoisted amounts, nested objects two levels deep, limits
//! and fees fan-out, envelope `resource_path` fields, whole-document fields.

use serde_json::{json, Value};

use crate::ScriptedSource;

pub fn user(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Satoshi Example",
        "username": "satoshi",
        "profile_location": null,
        "profile_bio": null,
        "profile_url": "https://www.coinbase.com/satoshi",
        "avatar_url": "https://images.coinbase.com/avatar?h=abc",
        "resource": "user",
        "resource_path": "/v2/user",
        "email": "satoshi@example.com",
        "time_zone": "Pacific Time (US & Canada)",
        "native_currency": "USD",
        "bitcoin_unit": "BTC",
        "state": "CA",
        "country": {"code": "US", "name": "United States"},
        "tiers": {"completed_description": "Level 3", "upgrade_button_text": null},
        "created_at": "2012-08-27T21:52:06Z"
    })
}

pub fn wallet_account(id: &str, currency: &str, balance: &str) -> Value {
    json!({
        "id": id,
        "name": format!("{currency} Wallet"),
        "primary": currency == "BTC",
        "type": "wallet",
        "currency": {"code": currency, "name": currency},
        "balance": {"amount": balance, "currency": currency},
        "native_balance": {"amount": "100.00", "currency": "USD"},
        "created_at": "2015-01-31T20:49:02Z",
        "updated_at": "2015-01-31T20:49:02Z",
        "resource": "account",
        "resource_path": format!("/v2/accounts/{id}")
    })
}

pub fn exchange_account(id: &str, currency: &str, balance: &str) -> Value {
    json!({
        "id": id,
        "currency": currency,
        "balance": balance,
        "available": balance,
        "hold": "0.0000000000000000",
        "profile_id": "prof-1",
        "trading_enabled": true
    })
}

/// Payment method with `buy` and `deposit` limits (two limit records).
pub fn payment_method(id: &str) -> Value {
    json!({
        "id": id,
        "type": "ach_bank_account",
        "name": "International Bank *****1111",
        "currency": "USD",
        "primary_buy": true,
        "primary_sell": true,
        "allow_buy": true,
        "allow_sell": true,
        "allow_deposit": true,
        "allow_withdraw": true,
        "instant_buy": false,
        "instant_sell": false,
        "verified": true,
        "created_at": "2015-01-31T20:49:02Z",
        "updated_at": "2015-02-11T16:53:57-08:00",
        "resource": "payment_method",
        "resource_path": format!("/v2/payment-methods/{id}"),
        "fiat_account": {
            "id": "ec0a5ac5-0bbd-5b4b-ba14-e26cc53a8d9e",
            "resource": "account",
            "resource_path": "/v2/accounts/ec0a5ac5-0bbd-5b4b-ba14-e26cc53a8d9e"
        },
        "limits": {
            "type": "bank",
            "name": "Bank Account",
            "buy": [{
                "period_in_days": 7,
                "total": {"amount": "3000.00", "currency": "USD"},
                "remaining": {"amount": "3000.00", "currency": "USD"},
                "description": "$3,000 of your $3,000 weekly bank limit remaining",
                "label": "Total USD limit"
            }],
            "deposit": [{
                "period_in_days": 7,
                "total": {"amount": "3000.00", "currency": "USD"},
                "remaining": {"amount": "2500.00", "currency": "USD"},
                "description": "$2,500 of your $3,000 weekly bank limit remaining",
                "label": "Total USD limit"
            }]
        }
    })
}

pub fn address(id: &str, account_id: &str) -> Value {
    json!({
        "id": id,
        "address": format!("1{id}xyz"),
        "name": null,
        "network": "bitcoin",
        "created_at": "2015-01-31T20:49:02Z",
        "updated_at": "2015-03-31T17:25:29-07:00",
        "resource": "address",
        "resource_path": format!("/v2/accounts/{account_id}/addresses/{id}")
    })
}

/// A buy with two fees (two fee records).
pub fn buy(id: &str, account_id: &str) -> Value {
    json!({
        "id": id,
        "status": "completed",
        "payment_method": {
            "id": "pm-1",
            "resource": "payment_method",
            "resource_path": "/v2/payment-methods/pm-1"
        },
        "transaction": {
            "id": format!("tx-{id}"),
            "resource": "transaction",
            "resource_path": format!("/v2/accounts/{account_id}/transactions/tx-{id}")
        },
        "amount": {"amount": "1.00000000", "currency": "BTC"},
        "total": {"amount": "10.25", "currency": "USD"},
        "subtotal": {"amount": "10.10", "currency": "USD"},
        "fee": {"amount": "0.15", "currency": "USD"},
        "fees": [
            {"type": "coinbase", "amount": {"amount": "0.00", "currency": "USD"}},
            {"type": "bank", "amount": {"amount": "0.15", "currency": "USD"}}
        ],
        "committed": true,
        "instant": false,
        "payout_at": "2015-02-18T16:54:00-08:00",
        "created_at": "2015-01-31T20:49:02Z",
        "updated_at": "2015-02-11T16:54:02-08:00",
        "resource": "buy",
        "resource_path": format!("/v2/accounts/{account_id}/buys/{id}")
    })
}

pub fn transaction(id: &str, account_id: &str, amount: &str) -> Value {
    json!({
        "id": id,
        "type": "send",
        "status": "completed",
        "amount": {"amount": amount, "currency": "BTC"},
        "native_amount": {"amount": "-1.00", "currency": "USD"},
        "description": null,
        "created_at": "2015-03-11T13:13:35-07:00",
        "updated_at": "2015-03-26T15:55:43-07:00",
        "resource": "transaction",
        "resource_path": format!("/v2/accounts/{account_id}/transactions/{id}"),
        "network": {
            "status": "off_blockchain",
            "name": "bitcoin",
            "transaction_fee": {"amount": "0.0001", "currency": "BTC"}
        },
        "to": {"resource": "email", "email": "rb@coinbase.com"},
        "details": {"title": "Sent bitcoin", "subtitle": "to User 2"}
    })
}

pub fn fill(trade_id: i64, order_id: &str) -> Value {
    json!({
        "created_at": "2019-11-20T22:27:01.013Z",
        "trade_id": trade_id,
        "product_id": "BTC-USD",
        "order_id": order_id,
        "liquidity": "T",
        "price": "8095.58000000",
        "size": "0.01000000",
        "fee": "0.4047790000000000",
        "side": "buy",
        "settled": true,
        "usd_volume": "80.9558000000000000"
    })
}

pub fn hold(id: &str, account_id: &str) -> Value {
    json!({
        "id": id,
        "account_id": account_id,
        "created_at": "2014-11-06T10:34:47.123456Z",
        "updated_at": "2014-11-06T10:40:47.123456Z",
        "amount": "4.23",
        "type": "order",
        "ref": "0a205de4-dd35-4370-a285-fe8fc375a273"
    })
}

pub fn ledger_entry(id: &str) -> Value {
    json!({
        "id": id,
        "created_at": "2019-06-11 22:11:56.382+00",
        "amount": "0.0010000000000000",
        "balance": "0.0120000000000000",
        "type": "match",
        "details": {
            "order_id": "d50ec984-77a8-460a-b958-66f114b0de9b",
            "trade_id": "74",
            "product_id": "BTC-USD"
        }
    })
}

pub fn order(id: &str) -> Value {
    json!({
        "id": id,
        "price": "0.10000000",
        "size": "0.01000000",
        "product_id": "BTC-USD",
        "side": "buy",
        "stp": "dc",
        "type": "limit",
        "time_in_force": "GTC",
        "post_only": false,
        "created_at": "2016-12-08T20:02:28.53864Z",
        "fill_fees": "0.0000000000000000",
        "filled_size": "0.00000000",
        "executed_value": "0.0000000000000000",
        "status": "done",
        "settled": true,
        "done_at": "2016-12-08T20:03:00Z",
        "done_reason": "filled"
    })
}

// ---------------------------------------------------------------------------
// Standard fixture
// ---------------------------------------------------------------------------

pub const USER_ID: &str = "u-1";
pub const WALLET_ACCOUNTS: [&str; 2] = ["acct-btc", "acct-usd"];
pub const EXCHANGE_ACCOUNT: &str = "ex-usd";

/// Wallet API with one user, two accounts, one payment method (+2 limits),
/// three addresses over two pages, one buy (+2 fees) and two transactions.
///
/// 1 + 2 + 3 + 3 + 3 + 2 = 14 flat records.
pub fn standard_wallet() -> ScriptedSource {
    ScriptedSource::new("wallet")
        .with_page("/v2/user", vec![user(USER_ID)])
        .with_page(
            "/v2/accounts",
            vec![
                wallet_account("acct-btc", "BTC", "1.00000000"),
                wallet_account("acct-usd", "USD", "250.00"),
            ],
        )
        .with_page("/v2/payment-methods", vec![payment_method("pm-1")])
        .with_pages(
            "/v2/accounts/acct-btc/addresses",
            vec![
                vec![address("addr-1", "acct-btc"), address("addr-2", "acct-btc")],
                vec![address("addr-3", "acct-btc")],
            ],
        )
        .with_page("/v2/accounts/acct-btc/buys", vec![buy("buy-1", "acct-btc")])
        .with_page(
            "/v2/accounts/acct-btc/transactions",
            vec![transaction("tx-1", "acct-btc", "-0.00100000")],
        )
        .with_page(
            "/v2/accounts/acct-usd/transactions",
            vec![transaction("tx-2", "acct-usd", "5.00")],
        )
}

/// Exchange API with one account, two fills, one hold, one ledger entry
/// and one order: 6 flat records.
pub fn standard_exchange() -> ScriptedSource {
    ScriptedSource::new("exchange")
        .with_page(
            "/accounts",
            vec![exchange_account(EXCHANGE_ACCOUNT, "USD", "80.2301373066930000")],
        )
        .with_page("/fills", vec![fill(74, "ord-1"), fill(75, "ord-1")])
        .with_page(
            &format!("/accounts/{EXCHANGE_ACCOUNT}/holds"),
            vec![hold("hold-1", EXCHANGE_ACCOUNT)],
        )
        .with_page(
            &format!("/accounts/{EXCHANGE_ACCOUNT}/ledger"),
            vec![ledger_entry("led-1")],
        )
        .with_page("/orders", vec![order("ord-1")])
}
