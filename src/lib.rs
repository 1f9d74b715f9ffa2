//! MessageRequest Kubernetes Operator
//!
//! This operator turns MessageRequest custom resources into one-shot sender
//! Pods and tracks each request through `New -> Sending -> Sent`.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
