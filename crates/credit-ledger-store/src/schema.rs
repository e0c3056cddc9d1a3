//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Credit transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by account, keyed by
    /// `len || account_id || transaction_id`. Value is empty (index only).
    pub const TRANSACTIONS_BY_ACCOUNT: &str = "transactions_by_account";

    /// Purchase intents, keyed by the provider's intent id.
    pub const PURCHASE_INTENTS: &str = "purchase_intents";

    /// Index: purchase intents by account, keyed by
    /// `len || account_id || intent_id`. Value is empty (index only).
    pub const PURCHASE_INTENTS_BY_ACCOUNT: &str = "purchase_intents_by_account";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_ACCOUNT,
        cf::PURCHASE_INTENTS,
        cf::PURCHASE_INTENTS_BY_ACCOUNT,
    ]
}
