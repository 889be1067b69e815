//! Provider-specific webhook verification and payload canonicalization.
//!
//! Each provider parses its raw payload into typed structs at the ingestion
//! boundary and reduces them to a canonical [`NewPaymentEvent`]; nothing
//! downstream touches provider JSON.

pub mod plaid;
pub mod stripe;

pub use plaid::PlaidWebhook;
pub use stripe::StripeWebhook;
