//! Store access for MessageRequests and their sender Pods

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{api::PostParams, Api, Client, ResourceExt};

use crate::crd::MessageRequest;
use crate::error::{Error, Result};

/// The operations the reconciler needs from the cluster.
///
/// Every method is a single round trip with no retries; callers decide what
/// an error means.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch a MessageRequest. Missing objects are `Error::NotFound`.
    async fn get_message_request(&self, namespace: &str, name: &str) -> Result<MessageRequest>;

    /// Create a sender Pod. A Pod with the same name is `Error::AlreadyExists`.
    async fn create_worker_task(&self, pod: &Pod) -> Result<()>;

    /// Fetch a sender Pod. Missing Pods are `Error::NotFound`.
    async fn get_worker_task(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Replace the status of a MessageRequest, conditional on its
    /// `resourceVersion`. A stale version is `Error::Conflict`.
    async fn update_status(&self, request: &MessageRequest) -> Result<MessageRequest>;
}

/// `MessageStore` backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageStore for KubeStore {
    async fn get_message_request(&self, namespace: &str, name: &str) -> Result<MessageRequest> {
        let api: Api<MessageRequest> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| classify(e, format!("messagerequest {}/{}", namespace, name)))
    }

    async fn create_worker_task(&self, pod: &Pod) -> Result<()> {
        let namespace = pod
            .namespace()
            .ok_or_else(|| Error::invalid(format!("pod {} has no namespace", pod.name_any())))?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), pod)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, format!("pod {}/{}", namespace, pod.name_any())))
    }

    async fn get_worker_task(&self, namespace: &str, name: &str) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| classify(e, format!("pod {}/{}", namespace, name)))
    }

    async fn update_status(&self, request: &MessageRequest) -> Result<MessageRequest> {
        let namespace = request.namespace().ok_or_else(|| {
            Error::invalid(format!("MessageRequest {} has no namespace", request.name_any()))
        })?;
        let name = request.name_any();
        let api: Api<MessageRequest> = Api::namespaced(self.client.clone(), &namespace);

        // PUT on the status subresource carries metadata.resourceVersion, so the
        // API server rejects the write if anyone updated the object since we read it.
        let body = serde_json::to_vec(request)?;
        api.replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| classify(e, format!("messagerequest {}/{}", namespace, name)))
    }
}

/// Map API server responses onto the operator's error taxonomy
fn classify(error: kube::Error, what: String) -> Error {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => Error::NotFound(what),
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            Error::AlreadyExists(what)
        }
        kube::Error::Api(api_err) if api_err.code == 409 => Error::Conflict(what),
        other => Error::Kube(other),
    }
}
