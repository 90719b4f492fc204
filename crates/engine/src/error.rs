use lifecycle_storage::StorageError;

use crate::config::ConfigError;
use crate::graph::{GraphError, UnknownStateError};

/// Errors that indicate a broken deployment rather than a refused request.
///
/// Refusals (illegal transition, permission denied, conflicts, outages) are
/// [`Rejection`](crate::executor::Rejection) values inside an `Ok` result.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A persisted state code that the graph does not declare.
    #[error(transparent)]
    UnknownState(#[from] UnknownStateError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage failure on a path that has no rejection to report it through
    /// (entity creation, listing, queries).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
