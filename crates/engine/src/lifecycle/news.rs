//! News article publication lifecycle.

use crate::graph::{GraphError, StateGraph};
use crate::lifecycle::EntityKind;

lifecycle_states! {
    /// Publication status of a news article.
    NewsStatus: EntityKind::News => {
        Draft => "DRAFT",
        Published => "PUBLISHED",
        Offline => "OFFLINE",
        /// Soft-deleted. The record stays in the store for the audit trail.
        Deleted => "DELETED",
    }
}

/// DRAFT → PUBLISHED → OFFLINE, and OFFLINE back to PUBLISHED or DRAFT.
/// Only drafts can be deleted; DELETED is the single terminal state.
pub fn news_graph() -> Result<StateGraph<NewsStatus>, GraphError> {
    use NewsStatus::*;

    StateGraph::builder(Draft)
        .transitions(Draft, &[Published, Deleted])
        .transitions(Published, &[Offline])
        .transitions(Offline, &[Published, Draft])
        .terminal(Deleted)
        .build()
}
