//! Core types for the credit ledger.
//!
//! This crate provides the foundational types shared by the store and the
//! ledger operations:
//!
//! - **Identifiers**: `AccountId`, `PaymentIntentId`, `TransactionId`
//! - **Accounts**: `Account`
//! - **Credits**: `CreditTransaction`, `TransactionKind`
//! - **Purchases**: `PurchaseIntent`
//! - **Pricing**: `PackageCatalog`, `CreditPackage`
//!
//! # Credit Unit
//!
//! Credits are the platform's internal usage currency, spent on AI image
//! generation and editing. They are stored as `i64` and are bought in fixed
//! packages (e.g. 100 credits for $9.99).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod error;
pub mod ids;
pub mod pricing;
pub mod purchase;

pub use account::{Account, DEFAULT_CURRENCY, DEFAULT_SIGNUP_BONUS_CREDITS};
pub use credits::{CreditTransaction, TransactionKind, UnknownKind};
pub use error::{ErrorKind, Failure, LedgerError, Result};
pub use ids::{AccountId, IdError, PaymentIntentId, TransactionId};
pub use pricing::{CatalogError, CreditPackage, PackageCatalog};
pub use purchase::{is_succeeded, PurchaseIntent, STATUS_SUCCEEDED};
