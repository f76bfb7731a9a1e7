//! Top-level migration choreography.
//!
//! The server must advertise its own address in the host-key known-hosts line
//! before the client connects, and that address does not exist until the
//! service is created. Ordering breaks the cycle: create service → resolve
//! address → mint keys → create secrets → run server pod → run client job.
//! Cleanup is applied to both clusters on every exit path.

use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::claim::{self, ClaimInfo, ClaimRef, Exposure};
use crate::cleanup;
use crate::error::{MigrateError, Result};
use crate::instance;
use crate::keys::KeyBundle;
use crate::resources;
use crate::watch;

const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Everything the orchestrator needs to know about one migration.
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub source: ClaimRef,
    pub dest: ClaimRef,
    /// Mount the source volume read-only.
    pub source_read_only: bool,
    /// Delete files at the destination that are absent at the source.
    pub delete_extraneous_files: bool,
    /// Endpoint exposure mode, derived from the two cluster contexts.
    pub exposure: Exposure,
}

/// Drives one migration run and owns its instance token.
pub struct Migrator {
    source_client: Client,
    dest_client: Client,
    instance: String,
}

impl Migrator {
    pub fn new(source_client: Client, dest_client: Client) -> Self {
        Self { source_client, dest_client, instance: instance::generate_token() }
    }

    /// The token tagging every object this run creates.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Run the migration, then tear down both sides regardless of outcome.
    pub async fn run(&self, request: &MigrationRequest) -> Result<()> {
        let outcome = self.migrate(request).await;
        self.cleanup(request).await;
        outcome
    }

    /// Best-effort teardown on both clusters. Safe to call more than once.
    pub async fn cleanup(&self, request: &MigrationRequest) {
        cleanup::run(&self.source_client, &request.source.namespace, &self.instance).await;
        cleanup::run(&self.dest_client, &request.dest.namespace, &self.instance).await;
    }

    async fn migrate(&self, request: &MigrationRequest) -> Result<()> {
        let source = claim::resolve(
            &self.source_client,
            &request.source,
            request.source_read_only,
            false,
            request.exposure,
        )
        .await?;
        let dest = claim::resolve(
            &self.dest_client,
            &request.dest,
            false,
            request.delete_extraneous_files,
            request.exposure,
        )
        .await?;
        info!("both claims exist and are bound, migrating as instance {}", self.instance);

        let address = self.deploy_sshd_service(&source).await?;
        info!("rsync server will be reachable at {}", address);

        let bundle = KeyBundle::generate(&address)?;
        self.deploy_secrets(&source, &dest, &bundle).await?;
        self.deploy_sshd_pod(&source).await?;
        self.run_rsync_job(&dest, &address).await?;

        info!("migration finished");
        Ok(())
    }

    /// Create the sshd service and resolve the address the client will dial.
    async fn deploy_sshd_service(&self, source: &ClaimInfo) -> Result<String> {
        let services: Api<Service> =
            Api::namespaced(self.source_client.clone(), &source.claim.namespace);
        let service = resources::sshd_service(&self.instance, source);
        let name = service.name_any();
        info!("creating service {}", name);
        let created = services
            .create(&PostParams::default(), &service)
            .await
            .map_err(|err| MigrateError::Create { kind: "service", name: name.clone(), source: err })?;

        match source.exposure {
            Exposure::ClusterIp => created
                .spec
                .and_then(|s| s.cluster_ip)
                .filter(|ip| !ip.is_empty())
                .ok_or(MigrateError::NoServiceAddress { name }),
            Exposure::LoadBalancer => self.await_ingress_address(&services, &name).await,
        }
    }

    /// Poll until the load balancer reports an ingress, then take the first
    /// assigned address. No timeout: cancelling is the caller's decision.
    async fn await_ingress_address(&self, services: &Api<Service>, name: &str) -> Result<String> {
        loop {
            let service = services.get(name).await?;
            let ingress = service
                .status
                .and_then(|s| s.load_balancer)
                .and_then(|lb| lb.ingress)
                .and_then(|entries| entries.into_iter().next());
            if let Some(entry) = ingress {
                let address = entry
                    .ip
                    .filter(|a| !a.is_empty())
                    .or(entry.hostname.filter(|a| !a.is_empty()));
                if let Some(address) = address {
                    return Ok(address);
                }
            }
            info!(
                "no external address on service {} yet, checking again in {}s",
                name,
                ADDRESS_POLL_INTERVAL.as_secs()
            );
            tokio::time::sleep(ADDRESS_POLL_INTERVAL).await;
        }
    }

    /// Create the key secret next to the source volume and, when the two
    /// sides do not share a namespace and cluster, an identical one next to
    /// the destination.
    async fn deploy_secrets(
        &self,
        source: &ClaimInfo,
        dest: &ClaimInfo,
        bundle: &KeyBundle,
    ) -> Result<()> {
        self.create_secret(&self.source_client, &source.claim.namespace, bundle).await?;
        if needs_dest_secret(&source.claim.namespace, &dest.claim.namespace, source.exposure) {
            self.create_secret(&self.dest_client, &dest.claim.namespace, bundle).await?;
        }
        Ok(())
    }

    async fn create_secret(&self, client: &Client, namespace: &str, bundle: &KeyBundle) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
        let secret = resources::ssh_secret(&self.instance, namespace, bundle);
        let name = secret.name_any();
        info!("creating secret {} in namespace {}", name, namespace);
        secrets
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|err| MigrateError::Create { kind: "secret", name, source: err })?;
        Ok(())
    }

    async fn deploy_sshd_pod(&self, source: &ClaimInfo) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.source_client.clone(), &source.claim.namespace);
        let pod = resources::sshd_pod(&self.instance, source);
        let name = pod.name_any();
        info!("creating sshd pod {}", name);
        pods.create(&PostParams::default(), &pod)
            .await
            .map_err(|err| MigrateError::Create { kind: "pod", name: name.clone(), source: err })?;

        info!("waiting for sshd pod {} to start running", name);
        watch::pod_running(&self.source_client, &source.claim.namespace, &name).await
    }

    async fn run_rsync_job(&self, dest: &ClaimInfo, address: &str) -> Result<()> {
        let jobs: Api<Job> = Api::namespaced(self.dest_client.clone(), &dest.claim.namespace);
        let job = resources::rsync_job(&self.instance, dest, address);
        let name = job.name_any();
        info!("creating rsync job {}", name);
        jobs.create(&PostParams::default(), &job)
            .await
            .map_err(|err| MigrateError::Create { kind: "job", name: name.clone(), source: err })?;

        info!("waiting for rsync job {} to finish", name);
        watch::job_succeeded(&self.dest_client, &dest.claim.namespace, &name).await
    }
}

/// Whether the key secret must be replicated into the destination namespace:
/// the rsync pod cannot mount the source-side secret when the two sides do
/// not share a namespace and cluster. Cross-cluster migrations always use
/// load-balancer exposure, so the exposure mode stands in for the context
/// comparison.
fn needs_dest_secret(source_namespace: &str, dest_namespace: &str, exposure: Exposure) -> bool {
    source_namespace != dest_namespace || exposure.is_cross_cluster()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_namespace_same_cluster_needs_one_secret() {
        assert!(!needs_dest_secret("ns-1", "ns-1", Exposure::ClusterIp));
    }

    #[test]
    fn different_namespaces_need_a_replicated_secret() {
        assert!(needs_dest_secret("ns-1", "ns-2", Exposure::ClusterIp));
    }

    #[test]
    fn different_clusters_need_a_replicated_secret() {
        assert!(needs_dest_secret("ns-1", "ns-1", Exposure::LoadBalancer));
    }

    #[test]
    fn different_namespaces_and_clusters_need_a_replicated_secret() {
        assert!(needs_dest_secret("ns-1", "ns-2", Exposure::LoadBalancer));
    }
}
