//! OAuth credential lifecycle for wearable providers.

mod error;
#[cfg(feature = "http")]
mod http;
mod manager;
mod record;
mod refresh;
mod store;

pub use error::{CredentialError, RefreshError};
#[cfg(feature = "http")]
pub use http::HttpTokenRefresher;
pub use manager::{CredentialManager, Freshness};
pub use record::{CredentialRecord, CredentialState, Provider, BEARER, DEFAULT_REFRESH_HORIZON};
pub use refresh::{RefreshRequest, RefreshedTokens, TokenRefresher};
pub use store::{CredentialStore, MemoryCredentialStore};
