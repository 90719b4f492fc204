//! Order fulfilment lifecycle.
//!
//! ```text
//! PENDING ─► CONFIRMED ─► PROCESSING ─► SHIPPED ─► DELIVERED ─► COMPLETED
//!    │           │             │            │
//!    └───────────┴─────────────┴────────────┴──► CANCELLED
//! ```

use crate::graph::{GraphError, StateGraph};
use crate::lifecycle::EntityKind;

lifecycle_states! {
    /// Status of a customer order.
    OrderStatus: EntityKind::Order => {
        Pending => "PENDING",
        Confirmed => "CONFIRMED",
        Processing => "PROCESSING",
        Shipped => "SHIPPED",
        Delivered => "DELIVERED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
}

pub fn order_graph() -> Result<StateGraph<OrderStatus>, GraphError> {
    use OrderStatus::*;

    StateGraph::builder(Pending)
        .transitions(Pending, &[Confirmed, Cancelled])
        .transitions(Confirmed, &[Processing, Cancelled])
        .transitions(Processing, &[Shipped, Cancelled])
        .transitions(Shipped, &[Delivered, Cancelled])
        .transitions(Delivered, &[Completed])
        .terminal(Completed)
        .terminal(Cancelled)
        .build()
}
