//! Stripe integration for credit purchases.
//!
//! Stripe handles:
//! - Payment intent creation for credit packages
//! - Payment intent status lookups during confirmation

pub mod client;
pub mod types;

pub use client::StripeClient;
pub use types::*;
