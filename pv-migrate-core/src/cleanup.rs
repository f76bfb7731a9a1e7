//! Best-effort teardown of a run's ephemeral objects.
//!
//! Deletion is driven entirely by the instance label selector, so cleanup
//! reaps whatever a partially failed run managed to create. Errors are logged
//! and swallowed: one side failing must not prevent the other side's cleanup,
//! and deleting an already-deleted object is a no-op.

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, ResourceExt};
use tracing::{info, warn};

use crate::instance;

/// Delete every object labelled with this run's instance token in `namespace`.
pub async fn run(client: &Client, namespace: &str, instance_token: &str) {
    info!("cleaning up instance {} in namespace {}", instance_token, namespace);

    let delete = DeleteParams::default();
    let list = ListParams::default().labels(&instance::instance_selector(instance_token));

    let jobs: Api<Job> = Api::namespaced(client.clone(), namespace);
    if let Err(e) = jobs.delete_collection(&delete, &list).await {
        warn!("failed to delete jobs: {}", e);
    }

    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    if let Err(e) = pods.delete_collection(&delete, &list).await {
        warn!("failed to delete pods: {}", e);
    }

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    if let Err(e) = secrets.delete_collection(&delete, &list).await {
        warn!("failed to delete secrets: {}", e);
    }

    // The core/v1 Service API has no delete-collection; list and delete one by one.
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    match services.list(&list).await {
        Ok(matched) => {
            for service in matched.items {
                if let Err(e) = services.delete(&service.name_any(), &delete).await {
                    warn!("failed to delete service {}: {}", service.name_any(), e);
                }
            }
        }
        Err(e) => warn!("failed to list services: {}", e),
    }

    info!("finished cleanup of instance {} in namespace {}", instance_token, namespace);
}
