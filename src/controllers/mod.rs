//! Kubernetes controllers for the MessageRequest CRD
//!
//! This module contains the controller that watches MessageRequests and the
//! sender Pods they own, and triggers reconciliation.

mod backoff;
mod message_request_controller;

pub use backoff::RetryBackoff;
pub use message_request_controller::run as run_message_request_controller;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::adapters::KubeStore;
use crate::config::OperatorConfig;

/// Shared context for the controller
pub struct Context {
    /// Store the reconciler reads and writes through
    pub store: KubeStore,
    pub config: OperatorConfig,
    /// Cancelled on shutdown; aborts in-flight store calls
    pub shutdown: CancellationToken,
    pub backoff: RetryBackoff,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: OperatorConfig, shutdown: CancellationToken) -> Self {
        Self {
            store: KubeStore::new(client),
            config,
            shutdown,
            backoff: RetryBackoff::new(),
        }
    }
}
