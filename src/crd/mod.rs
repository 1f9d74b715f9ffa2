//! Custom Resource Definitions for the MessageRequest Operator

mod message_request;

pub use message_request::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&MessageRequest::crd())?])
}
