//! Adapters between the reconciler and the cluster

mod store;
mod worker_task;

pub use store::*;
pub use worker_task::*;
