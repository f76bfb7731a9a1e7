//! Readiness watching.
//!
//! One capability covers both sides of the transfer: watch pods matching a
//! selector until a caller-specified phase is reached, treating `Failed` and
//! `Unknown` as fatal. The watch stream starts with a full list, so a pod
//! that reached a terminal phase before the stream was polled is still
//! observed; only the first terminal transition counts.

use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};

/// Where an observed phase sits relative to the phase the caller awaits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Reached,
    Pending,
    Terminal,
}

fn classify(phase: &str, awaited: &str) -> Verdict {
    if phase == awaited {
        Verdict::Reached
    } else if matches!(phase, "Failed" | "Unknown") {
        Verdict::Terminal
    } else {
        Verdict::Pending
    }
}

/// Block until the named pod is running.
pub async fn pod_running(client: &Client, namespace: &str, name: &str) -> Result<()> {
    let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
    await_phase(client, namespace, config, "Running", name).await
}

/// Block until the pod owned by the named job succeeds. Job-owned pods are
/// matched through the `job-name` label the platform injects.
pub async fn job_succeeded(client: &Client, namespace: &str, job_name: &str) -> Result<()> {
    let config = watcher::Config::default().labels(&format!("job-name={job_name}"));
    await_phase(client, namespace, config, "Succeeded", job_name).await
}

async fn await_phase(
    client: &Client,
    namespace: &str,
    config: watcher::Config,
    awaited: &str,
    target: &str,
) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let stream = watcher(pods, config).applied_objects();
    futures::pin_mut!(stream);

    while let Some(pod) = stream.try_next().await? {
        let phase = pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default();
        match classify(&phase, awaited) {
            Verdict::Reached => {
                info!("pod {} reached phase {}", pod.name_any(), phase);
                return Ok(());
            }
            Verdict::Terminal => {
                return Err(MigrateError::PodTerminal { name: pod.name_any(), phase });
            }
            Verdict::Pending => {
                debug!("pod {} is in phase {:?}, waiting for {}", pod.name_any(), phase, awaited);
            }
        }
    }

    Err(MigrateError::WatchClosed { name: target.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awaited_phase_is_reached() {
        assert_eq!(classify("Running", "Running"), Verdict::Reached);
        assert_eq!(classify("Succeeded", "Succeeded"), Verdict::Reached);
    }

    #[test]
    fn failed_and_unknown_are_terminal() {
        assert_eq!(classify("Failed", "Running"), Verdict::Terminal);
        assert_eq!(classify("Unknown", "Succeeded"), Verdict::Terminal);
    }

    #[test]
    fn intermediate_phases_keep_waiting() {
        assert_eq!(classify("Pending", "Running"), Verdict::Pending);
        assert_eq!(classify("Running", "Succeeded"), Verdict::Pending);
        assert_eq!(classify("", "Running"), Verdict::Pending);
    }
}
