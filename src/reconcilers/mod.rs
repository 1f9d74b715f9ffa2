//! Reconcilers for the MessageRequest CRD
//!
//! This module contains the business logic for reconciling MessageRequests.
//! Reconcilers are responsible for:
//! - Deciding the next phase from the current status and the sender Pod
//! - Creating sender Pods
//! - Updating resource status

mod call_scope;
pub mod message_request;

pub use call_scope::CallScope;
