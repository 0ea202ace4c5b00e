//! Kind-to-handler routing for queued writes.

mod dispatcher;
mod error;
mod mutation;
mod write_through;
mod writer;

pub use dispatcher::{Delivery, Dispatcher};
pub use error::{DispatchError, RemoteError};
pub use mutation::{Mutation, MutationKind};
pub use write_through::{WriteOutcome, WriteThrough};
pub use writer::{RemoteWriter, WriteOptions};
