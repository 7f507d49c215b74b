pub mod client;
pub mod error;
pub mod reconciler;
pub mod retry;

pub use client::{IdsResponse, MutationResponse, SyncApi, VersionInfo};
pub use error::SyncApiError;
pub use reconciler::{CycleError, CycleOutcome, SyncReconciler};
pub use retry::RetryPolicy;
