//! Azure AD authentication module.
//!
//! Certificate-based confidential client, per-user account cache, and the
//! provider wrapper that web handlers use to obtain Graph access tokens.

pub mod cache;
pub mod cert_store;
pub mod confidential;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_fixtures;
