//! Credit ledger with Stripe-backed credit purchases.
//!
//! This crate ties the ledger's business rules to a storage backend and a
//! payment provider:
//!
//! - Credit purchases via Stripe payment intents, confirmed at most once
//! - Spending and granting credits
//! - Balance, history and per-kind totals
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{CreditLedger, LedgerConfig};
//!
//! # async fn run() -> credit_ledger::Result<()> {
//! let ledger = CreditLedger::from_config(&LedgerConfig::from_env()?).await?;
//!
//! ledger.open_account("user_123").await?;
//! let created = ledger.create_purchase_intent("user_123", 500).await?;
//! // ... the client completes payment with `created.client_secret` ...
//! let confirmed = ledger
//!     .confirm_purchase(created.intent_id.as_str(), "user_123")
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod ledger;
pub mod provider;
pub mod stripe;

pub use config::{LedgerConfig, StoreBackend};
pub use credit_ledger_core::{
    Account, CreditTransaction, ErrorKind, Failure, LedgerError, PackageCatalog, PurchaseIntent,
    Result, TransactionKind,
};
pub use ledger::{
    CreditLedger, CreditSummary, HistoryPage, PurchaseConfirmed, PurchaseIntentCreated,
    SpendReceipt, MAX_HISTORY_LIMIT, SIGNUP_BONUS_DESCRIPTION,
};
pub use provider::{CreateIntentRequest, PaymentProvider, ProviderError, ProviderIntent};
pub use stripe::StripeClient;
