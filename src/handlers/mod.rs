//! HTTP handlers for webhooks and the admin API.

pub mod matches;
pub mod payments;
pub mod plaid;
pub mod stripe;
