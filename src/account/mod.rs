//! ACME account lifecycle: registration, lookup, and the
//! select-or-create policy an order driver uses to find the account it
//! should sign with (§4.4).
pub mod manager;

pub use manager::{Account, AccountManager, ExternalAccountBinding};
