//! MessageRequest Custom Resource Definition

use std::fmt;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MessageRequest resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "messaging.k8s.dev",
    version = "v1alpha1",
    kind = "MessageRequest",
    plural = "messagerequests",
    singular = "messagerequest",
    shortname = "msgreq",
    namespaced,
    status = "MessageRequestStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Reason", "type": "string", "jsonPath": ".status.reason"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequestSpec {
    /// Message text, passed to the sender as its only argument
    pub text: String,

    /// Sender image
    pub image: String,

    /// Secret exposed to the sender as environment variables
    pub secret: SecretRef,
}

/// Reference to the Secret holding delivery credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Secret name
    pub name: String,

    /// Secret namespace. Pods can only consume Secrets from their own
    /// namespace, so anything else is ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Lifecycle phase of a MessageRequest
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum MessagePhase {
    /// Not yet picked up. An empty phase string reads as `New`.
    #[default]
    #[serde(alias = "")]
    New,
    /// Sender pod created, waiting for it to finish
    Sending,
    /// Sender pod succeeded
    Sent,
    /// Sender pod failed; reset to `New` on the next reconcile
    Error,
}

impl MessagePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePhase::New => "New",
            MessagePhase::Sending => "Sending",
            MessagePhase::Sent => "Sent",
            MessagePhase::Error => "Error",
        }
    }
}

impl fmt::Display for MessagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition flag carried alongside the phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// MessageRequest status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequestStatus {
    /// Current phase (New, Sending, Sent, Error)
    #[serde(default)]
    pub phase: MessagePhase,

    /// Condition flag for the current phase
    #[serde(default)]
    pub status: ConditionStatus,

    /// Machine-readable reason for the current phase
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// When the phase last changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl MessageRequest {
    /// Current phase; a missing status is `New`
    pub fn phase(&self) -> MessagePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}
