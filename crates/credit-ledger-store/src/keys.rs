//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use credit_ledger_core::{AccountId, PaymentIntentId, TransactionId};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a purchase intent key from a payment intent ID.
#[must_use]
pub fn purchase_intent_key(intent_id: &PaymentIntentId) -> Vec<u8> {
    intent_id.as_bytes().to_vec()
}

/// Create a prefix for iterating all transactions for an account.
///
/// Format: `len (u16 BE) || account_id`
///
/// Account ids are variable length, so the length prefix keeps one account's
/// range from overlapping another whose id starts with the same bytes.
#[must_use]
pub fn account_transactions_prefix(account_id: &AccountId) -> Vec<u8> {
    let bytes = account_id.as_bytes();
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    let mut key = Vec::with_capacity(2 + bytes.len() + 16);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

/// Create an account-transaction index key.
///
/// Format: `len (u16 BE) || account_id || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for an account sort by time.
#[must_use]
pub fn account_transaction_key(account_id: &AccountId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = account_transactions_prefix(account_id);
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create an account-purchase-intent index key.
///
/// Format: `len (u16 BE) || account_id || intent_id`
#[must_use]
pub fn account_purchase_intent_key(account_id: &AccountId, intent_id: &PaymentIntentId) -> Vec<u8> {
    let mut key = account_transactions_prefix(account_id);
    key.extend_from_slice(intent_id.as_bytes());
    key
}

/// Extract the intent ID from an account-purchase-intent index key.
///
/// Returns `None` if the key is malformed.
#[must_use]
pub fn extract_purchase_intent_id(key: &[u8]) -> Option<PaymentIntentId> {
    let len_bytes: [u8; 2] = key.get(..2)?.try_into().ok()?;
    let start = 2 + usize::from(u16::from_be_bytes(len_bytes));
    let raw = std::str::from_utf8(key.get(start..)?).ok()?;
    PaymentIntentId::new(raw).ok()
}

/// Extract the transaction ID from an account-transaction index key.
///
/// Returns `None` if the key is malformed.
#[must_use]
pub fn extract_transaction_id(key: &[u8]) -> Option<TransactionId> {
    let len_bytes: [u8; 2] = key.get(..2)?.try_into().ok()?;
    let start = 2 + usize::from(u16::from_be_bytes(len_bytes));
    let bytes: [u8; 16] = key.get(start..start + 16)?.try_into().ok()?;
    if key.len() != start + 16 {
        return None;
    }
    Some(TransactionId::from_bytes(bytes))
}
