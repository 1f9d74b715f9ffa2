//! MessageRequest reconciler
//!
//! Drives a MessageRequest through `New -> Sending -> Sent`, with `Error`
//! resetting to `New`. Each call re-reads the request (and, while sending,
//! its sender Pod) and performs at most one transition:
//!
//! | phase   | observed Pod        | action                          | next    | requeue |
//! |---------|---------------------|---------------------------------|---------|---------|
//! | Error   | -                   | reset status                    | New     | no      |
//! | Sent    | -                   | none                            | Sent    | no      |
//! | New     | -                   | create Pod, write status        | Sending | yes     |
//! | Sending | Succeeded           | write status                    | Sent    | yes     |
//! | Sending | Failed              | write status                    | Error   | yes     |
//! | Sending | anything else       | none                            | Sending | no      |

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::adapters::{
    build_worker_task, verify_worker_task, verify_worker_task_owner, worker_task_name,
    MessageStore, WorkerPhase,
};
use crate::crd::{ConditionStatus, MessagePhase, MessageRequest, MessageRequestStatus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::CallScope;

/// What the driver should do after a successful reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Wait for the next watch event or resync
    AwaitChange,
    /// Call again soon
    Requeue,
}

/// Side effect that must happen before the status is committed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    CreateWorkerTask,
}

/// Result of evaluating the transition table
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// Status to commit, `None` when nothing changes
    pub next: Option<MessageRequestStatus>,
    pub effect: Effect,
    pub requeue: bool,
}

impl Decision {
    fn stay() -> Self {
        Self {
            next: None,
            effect: Effect::None,
            requeue: false,
        }
    }

    fn to(phase: MessagePhase, now: DateTime<Utc>, effect: Effect, requeue: bool) -> Self {
        Self {
            next: Some(status_for(phase, now)),
            effect,
            requeue,
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.requeue {
            Outcome::Requeue
        } else {
            Outcome::AwaitChange
        }
    }
}

/// Status written when entering `phase`
pub fn status_for(phase: MessagePhase, now: DateTime<Utc>) -> MessageRequestStatus {
    let (reason, message) = match phase {
        MessagePhase::New => ("New", "New message to be sent"),
        MessagePhase::Sending => ("Sending", "Sending message"),
        MessagePhase::Sent => ("Sent", "Message successfully sent"),
        MessagePhase::Error => ("Failed", "Sender task failed, check the sender pod logs"),
    };

    MessageRequestStatus {
        phase,
        status: ConditionStatus::True,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Some(now),
    }
}

/// Evaluate the transition table.
///
/// `observed` is the sender Pod's run phase; it only matters while the
/// request is `Sending`.
pub fn decide(
    current: Option<&MessageRequestStatus>,
    observed: Option<WorkerPhase>,
    now: DateTime<Utc>,
) -> Decision {
    let phase = current.map(|s| s.phase).unwrap_or_default();

    match phase {
        MessagePhase::Error => Decision::to(MessagePhase::New, now, Effect::None, false),
        MessagePhase::Sent => Decision::stay(),
        MessagePhase::New => {
            Decision::to(MessagePhase::Sending, now, Effect::CreateWorkerTask, true)
        }
        MessagePhase::Sending => match observed {
            Some(WorkerPhase::Succeeded) => {
                Decision::to(MessagePhase::Sent, now, Effect::None, true)
            }
            Some(WorkerPhase::Failed) => Decision::to(MessagePhase::Error, now, Effect::None, true),
            _ => Decision::stay(),
        },
    }
}

/// Reconcile one MessageRequest identified by namespace and name
pub async fn reconcile<S>(
    store: &S,
    scope: &CallScope,
    namespace: &str,
    name: &str,
) -> Result<Outcome>
where
    S: MessageStore + ?Sized,
{
    let request = match scope.call(store.get_message_request(namespace, name)).await {
        Ok(request) => request,
        Err(e) if e.is_not_found() => {
            debug!(name = %name, namespace = %namespace, "MessageRequest is gone, nothing to do");
            return Ok(Outcome::AwaitChange);
        }
        Err(e) => return Err(e),
    };

    let phase = request.phase();
    let observed = match phase {
        MessagePhase::Sending => observe_worker_task(store, scope, &request).await?,
        _ => None,
    };

    let decision = decide(request.status.as_ref(), observed, Utc::now());
    let Some(next) = decision.next.clone() else {
        debug!(
            name = %name,
            namespace = %namespace,
            phase = %phase,
            worker = ?observed,
            "Nothing to do"
        );
        return Ok(decision.outcome());
    };

    if decision.effect == Effect::CreateWorkerTask {
        ensure_worker_task(store, scope, &request).await?;
    }

    commit_status(store, scope, request, next).await?;
    Ok(decision.outcome())
}

/// Read the sender Pod's run phase.
///
/// A Pod that cannot be found is an error: the request says it is sending,
/// so the Pod should exist, and redelivery covers API server lag. A Pod with
/// the right name but another controller is an error too, its phase says
/// nothing about this request.
pub async fn observe_worker_task<S>(
    store: &S,
    scope: &CallScope,
    request: &MessageRequest,
) -> Result<Option<WorkerPhase>>
where
    S: MessageStore + ?Sized,
{
    let namespace = request_namespace(request)?;
    let pod_name = worker_task_name(&request.name_any());
    let pod = scope.call(store.get_worker_task(&namespace, &pod_name)).await?;
    verify_worker_task_owner(&pod, request)?;
    Ok(WorkerPhase::of(&pod))
}

/// Create the sender Pod, treating an existing one as already created when it
/// has the expected shape.
///
/// A previous attempt may have created the Pod and then failed to write the
/// `Sending` status; the retry must still go through. Any other Pod holding
/// the name fails the reconcile, leaving the request in `New`.
pub async fn ensure_worker_task<S>(
    store: &S,
    scope: &CallScope,
    request: &MessageRequest,
) -> Result<()>
where
    S: MessageStore + ?Sized,
{
    let pod = build_worker_task(request)?;
    let pod_name = pod.name_any();

    match scope.call(store.create_worker_task(&pod)).await {
        Ok(()) => {
            info!(name = %request.name_any(), pod = %pod_name, "Created sender pod");
            metrics::WORKER_TASKS_CREATED.with_label_values(&["created"]).inc();
            Ok(())
        }
        Err(Error::AlreadyExists(_)) => {
            let namespace = request_namespace(request)?;
            let existing = scope.call(store.get_worker_task(&namespace, &pod_name)).await?;
            if let Err(e) = verify_worker_task(&existing, request) {
                warn!(name = %request.name_any(), pod = %pod_name, error = %e, "Sender pod name is taken");
                metrics::WORKER_TASKS_CREATED.with_label_values(&["foreign"]).inc();
                return Err(e);
            }
            warn!(name = %request.name_any(), pod = %pod_name, "Sender pod already exists, reusing it");
            metrics::WORKER_TASKS_CREATED.with_label_values(&["existing"]).inc();
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Write `next` as the request's status, conditional on the version that was read
pub async fn commit_status<S>(
    store: &S,
    scope: &CallScope,
    mut request: MessageRequest,
    next: MessageRequestStatus,
) -> Result<MessageRequest>
where
    S: MessageStore + ?Sized,
{
    let from = request.phase();
    let to = next.phase;
    request.status = Some(next);

    let updated = scope.call(store.update_status(&request)).await?;

    info!(
        name = %request.name_any(),
        namespace = request.namespace().as_deref().unwrap_or_default(),
        from = %from,
        to = %to,
        "Updated MessageRequest phase"
    );
    metrics::PHASE_TRANSITIONS
        .with_label_values(&[from.as_str(), to.as_str()])
        .inc();

    Ok(updated)
}

fn request_namespace(request: &MessageRequest) -> Result<String> {
    request
        .namespace()
        .ok_or_else(|| Error::invalid(format!("MessageRequest {} has no namespace", request.name_any())))
}
