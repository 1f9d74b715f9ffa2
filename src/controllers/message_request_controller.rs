//! MessageRequest controller
//!
//! Watches MessageRequest resources and their sender Pods and triggers
//! reconciliation.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Config as ControllerConfig, Controller, Error as ControllerError},
        watcher::{self, Config as WatcherConfig},
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::adapters::managed_by_selector;
use crate::controllers::{Context, RetryBackoff};
use crate::crd::MessageRequest;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::message_request::{self as message_reconciler, Outcome};
use crate::reconcilers::CallScope;

const KIND: &str = "MessageRequest";

/// Run the MessageRequest controller.
///
/// Returns once the context's shutdown token is cancelled and in-flight
/// reconciles have drained.
pub async fn run(client: Client, context: Arc<Context>) {
    let (requests, pods): (Api<MessageRequest>, Api<Pod>) = match &context.config.namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    // Verify CRD is installed
    if let Err(e) = requests.list(&ListParams::default().limit(1)).await {
        error!("MessageRequest CRD not installed: {}", e);
        return;
    }

    info!(
        namespace = context.config.namespace.as_deref().unwrap_or("*"),
        concurrency = context.config.concurrency,
        "Starting MessageRequest controller"
    );

    let shutdown = context.shutdown.clone();
    let stream_ctx = context.clone();

    Controller::new(requests, WatcherConfig::default())
        .owns(pods, WatcherConfig::default().labels(&managed_by_selector()))
        .with_config(ControllerConfig::default().concurrency(context.config.concurrency))
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, context)
        .for_each(|result| {
            let ctx = stream_ctx.clone();
            async move {
                match result {
                    Ok((obj, _action)) => {
                        info!(
                            name = %obj.name,
                            namespace = obj.namespace.as_deref().unwrap_or("default"),
                            "Reconciled MessageRequest"
                        );
                    }
                    Err(e) => {
                        forget_deleted(&ctx.backoff, &e);
                        error!(error = %e, "Reconciliation error");
                        metrics::RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
                    }
                }
            }
        })
        .await;

    info!("MessageRequest controller stopped");
}

/// Drop retry state for a request that was deleted while it was failing.
///
/// Without a finalizer a deleted request is never reconciled again; its
/// pending retry surfaces here as `ObjectNotFound` instead.
fn forget_deleted(backoff: &RetryBackoff, err: &ControllerError<Error, watcher::Error>) {
    if let ControllerError::ObjectNotFound(obj_ref) = err {
        backoff.reset(&key(obj_ref.namespace.as_deref().unwrap_or_default(), &obj_ref.name));
    }
}

/// Main reconciliation function.
///
/// The watched object only identifies what to reconcile; the reconciler reads
/// the current state itself.
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<MessageRequest>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::invalid(format!("MessageRequest {} has no namespace", name)))?;

    let scope = CallScope::new(ctx.shutdown.clone(), ctx.config.reconcile_timeout());
    let outcome = message_reconciler::reconcile(&ctx.store, &scope, &namespace, &name).await?;

    ctx.backoff.reset(&key(&namespace, &name));

    Ok(match outcome {
        Outcome::Requeue => Action::requeue(ctx.config.requeue_after()),
        Outcome::AwaitChange => Action::await_change(),
    })
}

/// Error policy for the controller
fn error_policy(obj: Arc<MessageRequest>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let delay = ctx.backoff.next_delay(&key(&namespace, &name), error);

    error!(
        name = %name,
        namespace = %namespace,
        error = %error,
        retry_in_secs = delay.as_secs_f64(),
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(delay)
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}
