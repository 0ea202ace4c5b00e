//! Timer-driven credential upkeep tied to the signed-in session.

mod background;
mod pull;

pub use background::{BackgroundSync, SyncStats};
pub use pull::{NoopPull, ProviderPull, PullError};

pub(crate) use background::run_tick;
