//! Builds the sender Pod that delivers a MessageRequest

use k8s_openapi::api::core::v1::Pod;
use kube::{Resource, ResourceExt};
use serde_json::json;

use crate::crd::MessageRequest;
use crate::error::{Error, Result};

/// Prefix of every sender Pod name
pub const WORKER_TASK_PREFIX: &str = "sender-";

/// Name of the container running the sender image
pub const SENDER_CONTAINER: &str = "sender";

/// Label used to scope the Pod watch to Pods this operator created
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "message-request-operator";

/// Run phase of a sender Pod as reported by the kubelet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkerPhase {
    /// Read the phase off a Pod. `None` until the kubelet has reported one.
    pub fn of(pod: &Pod) -> Option<Self> {
        let phase = pod.status.as_ref()?.phase.as_deref()?;
        Some(match phase {
            "Pending" => WorkerPhase::Pending,
            "Running" => WorkerPhase::Running,
            "Succeeded" => WorkerPhase::Succeeded,
            "Failed" => WorkerPhase::Failed,
            _ => WorkerPhase::Unknown,
        })
    }
}

/// Sender Pod name for a MessageRequest name
pub fn worker_task_name(request_name: &str) -> String {
    format!("{}{}", WORKER_TASK_PREFIX, request_name)
}

/// Label selector matching every Pod this operator manages
pub fn managed_by_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)
}

/// Build the sender Pod for a MessageRequest.
///
/// The Pod lives in the request's namespace and carries a controller owner
/// reference, so it is garbage collected with the request and its events are
/// routed back to the request's reconcile key.
pub fn build_worker_task(request: &MessageRequest) -> Result<Pod> {
    let namespace = request
        .namespace()
        .ok_or_else(|| Error::invalid(format!("MessageRequest {} has no namespace", request.name_any())))?;
    let owner = request
        .controller_owner_ref(&())
        .ok_or_else(|| Error::invalid(format!("MessageRequest {}/{} has no uid", namespace, request.name_any())))?;

    let pod = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": worker_task_name(&request.name_any()),
            "namespace": namespace,
            "labels": { MANAGED_BY_LABEL: MANAGED_BY_VALUE },
            "ownerReferences": [owner],
        },
        "spec": {
            "restartPolicy": "OnFailure",
            "containers": [{
                "name": SENDER_CONTAINER,
                "image": request.spec.image,
                "args": [request.spec.text],
                "envFrom": [{ "secretRef": { "name": request.spec.secret.name } }],
            }],
        },
    }))?;

    Ok(pod)
}

/// Check that a Pod is controlled by `request`.
///
/// Matching on uid rather than name keeps a leftover Pod of a deleted request
/// with the same name from being read as this request's sender.
pub fn verify_worker_task_owner(pod: &Pod, request: &MessageRequest) -> Result<()> {
    let owner_uid = pod
        .owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))
        .map(|owner| owner.uid.as_str());

    match (owner_uid, request.uid()) {
        (Some(owner), Some(uid)) if owner == uid => Ok(()),
        _ => Err(Error::foreign(format!(
            "{} is not controlled by MessageRequest {} (owner uid {:?})",
            pod_ref(pod),
            request.name_any(),
            owner_uid
        ))),
    }
}

/// Check that an existing Pod is the sender Pod `build_worker_task` would
/// create for `request`: same controller and a `sender` container running
/// the request's image with the request's text.
pub fn verify_worker_task(pod: &Pod, request: &MessageRequest) -> Result<()> {
    verify_worker_task_owner(pod, request)?;

    let container = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.iter().find(|c| c.name == SENDER_CONTAINER));
    let Some(container) = container else {
        return Err(Error::foreign(format!(
            "{} has no {} container",
            pod_ref(pod),
            SENDER_CONTAINER
        )));
    };

    let expected_args = [request.spec.text.clone()];
    if container.image.as_deref() != Some(request.spec.image.as_str())
        || container.args.as_deref() != Some(&expected_args[..])
    {
        return Err(Error::foreign(format!(
            "{} does not run {} with the request's text",
            pod_ref(pod),
            request.spec.image
        )));
    }

    Ok(())
}

fn pod_ref(pod: &Pod) -> String {
    format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{MessageRequestSpec, SecretRef};
    use k8s_openapi::api::core::v1::PodStatus;

    fn request(namespace: Option<&str>, uid: Option<&str>) -> MessageRequest {
        let mut request = MessageRequest::new(
            "hello",
            MessageRequestSpec {
                text: "hi".to_string(),
                image: "sender:latest".to_string(),
                secret: SecretRef {
                    name: "bot-token".to_string(),
                    namespace: None,
                },
            },
        );
        request.metadata.namespace = namespace.map(str::to_string);
        request.metadata.uid = uid.map(str::to_string);
        request
    }

    #[test]
    fn worker_task_name_is_prefixed() {
        assert_eq!(worker_task_name("hello"), "sender-hello");
    }

    #[test]
    fn builds_sender_pod_from_request() {
        let pod = build_worker_task(&request(Some("team-a"), Some("uid-1"))).unwrap();

        assert_eq!(pod.metadata.name.as_deref(), Some("sender-hello"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(
            pod.labels().get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY_VALUE)
        );

        let owners = pod.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "MessageRequest");
        assert_eq!(owners[0].uid, "uid-1");
        assert_eq!(owners[0].controller, Some(true));

        let spec = serde_json::to_value(pod.spec.as_ref().unwrap()).unwrap();
        assert_eq!(spec["restartPolicy"], "OnFailure");
        let container = &spec["containers"][0];
        assert_eq!(container["name"], SENDER_CONTAINER);
        assert_eq!(container["image"], "sender:latest");
        assert_eq!(container["args"], json!(["hi"]));
        assert_eq!(container["envFrom"][0]["secretRef"]["name"], "bot-token");
    }

    #[test]
    fn requires_namespace_and_uid() {
        assert!(matches!(
            build_worker_task(&request(None, Some("uid-1"))),
            Err(Error::InvalidResource(_))
        ));
        assert!(matches!(
            build_worker_task(&request(Some("default"), None)),
            Err(Error::InvalidResource(_))
        ));
    }

    #[test]
    fn accepts_own_sender_pod() {
        let request = request(Some("default"), Some("uid-1"));
        let pod = build_worker_task(&request).unwrap();
        assert!(verify_worker_task(&pod, &request).is_ok());
    }

    #[test]
    fn rejects_pod_owned_by_another_request() {
        let old = request(Some("default"), Some("uid-old"));
        let pod = build_worker_task(&old).unwrap();

        let fresh = request(Some("default"), Some("uid-new"));
        assert!(matches!(
            verify_worker_task(&pod, &fresh),
            Err(Error::Foreign(_))
        ));
    }

    #[test]
    fn rejects_unowned_pod() {
        let request = request(Some("default"), Some("uid-1"));
        let mut pod = build_worker_task(&request).unwrap();
        pod.metadata.owner_references = None;
        assert!(matches!(
            verify_worker_task(&pod, &request),
            Err(Error::Foreign(_))
        ));
    }

    #[test]
    fn rejects_pod_with_stale_text_or_image() {
        let mut request = request(Some("default"), Some("uid-1"));
        let pod = build_worker_task(&request).unwrap();

        request.spec.text = "edited".to_string();
        assert!(matches!(
            verify_worker_task(&pod, &request),
            Err(Error::Foreign(_))
        ));
        assert!(verify_worker_task_owner(&pod, &request).is_ok());

        request.spec.text = "hi".to_string();
        request.spec.image = "sender:v2".to_string();
        assert!(matches!(
            verify_worker_task(&pod, &request),
            Err(Error::Foreign(_))
        ));
    }

    #[test]
    fn reads_worker_phase() {
        let mut pod = Pod::default();
        assert_eq!(WorkerPhase::of(&pod), None);

        pod.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        assert_eq!(WorkerPhase::of(&pod), Some(WorkerPhase::Succeeded));

        pod.status = Some(PodStatus {
            phase: Some("Evicted".to_string()),
            ..Default::default()
        });
        assert_eq!(WorkerPhase::of(&pod), Some(WorkerPhase::Unknown));
    }
}
