//! Cross-object assertions over the ephemeral manifests of one run.
//!
//! The builders are exercised together the way the orchestrator wires them:
//! one instance token, one key bundle, a service + secret(s) + server pod +
//! client job. These tests pin the contracts the transfer images and the
//! cleanup selector rely on.

use pv_migrate_core::instance::{self, Component};
use pv_migrate_core::resources;
use pv_migrate_core::{ClaimInfo, ClaimRef, Exposure, KeyBundle};

fn claim(namespace: &str, name: &str, read_only: bool, exposure: Exposure) -> ClaimInfo {
    ClaimInfo {
        claim: ClaimRef { namespace: namespace.to_string(), name: name.to_string() },
        owner_node: Some("node-a".to_string()),
        read_only,
        delete_extraneous_files: false,
        exposure,
    }
}

#[test]
fn every_object_carries_the_uniform_label_set() {
    let token = "ab1cd";
    let source = claim("ns-1", "pvc-a", true, Exposure::ClusterIp);
    let dest = claim("ns-1", "pvc-b", false, Exposure::ClusterIp);
    let bundle = KeyBundle::generate("10.96.0.7").unwrap();

    let sshd_labels = Some(instance::labels(Component::Sshd, token));
    let rsync_labels = Some(instance::labels(Component::Rsync, token));

    assert_eq!(resources::sshd_service(token, &source).metadata.labels, sshd_labels);
    assert_eq!(resources::ssh_secret(token, "ns-1", &bundle).metadata.labels, sshd_labels);
    assert_eq!(resources::sshd_pod(token, &source).metadata.labels, sshd_labels);
    assert_eq!(resources::rsync_job(token, &dest, "10.96.0.7").metadata.labels, rsync_labels);
}

#[test]
fn object_names_are_deterministic_in_the_token() {
    let token = "ab1cd";
    let source = claim("ns-1", "pvc-a", true, Exposure::ClusterIp);
    let dest = claim("ns-1", "pvc-b", false, Exposure::ClusterIp);
    let bundle = KeyBundle::generate("10.96.0.7").unwrap();

    assert_eq!(
        resources::sshd_service(token, &source).metadata.name.as_deref(),
        Some("pv-migrate-sshd-ab1cd")
    );
    assert_eq!(
        resources::sshd_pod(token, &source).metadata.name.as_deref(),
        Some("pv-migrate-sshd-ab1cd")
    );
    assert_eq!(
        resources::rsync_job(token, &dest, "10.96.0.7").metadata.name.as_deref(),
        Some("pv-migrate-rsync-ab1cd")
    );
    assert_eq!(
        resources::ssh_secret(token, "ns-1", &bundle).metadata.name.as_deref(),
        Some("pv-migrate-ab1cd")
    );
}

#[test]
fn pods_reference_the_secret_the_run_creates() {
    let token = "ab1cd";
    let source = claim("ns-1", "pvc-a", true, Exposure::ClusterIp);
    let dest = claim("ns-2", "pvc-b", false, Exposure::ClusterIp);
    let bundle = KeyBundle::generate("10.96.0.7").unwrap();

    let secret_name = resources::ssh_secret(token, "ns-1", &bundle).metadata.name.unwrap();

    let pod = resources::sshd_pod(token, &source);
    let pod_secret = pod
        .spec
        .unwrap()
        .volumes
        .unwrap()
        .into_iter()
        .find_map(|v| v.secret)
        .and_then(|s| s.secret_name)
        .unwrap();
    assert_eq!(pod_secret, secret_name);

    let job = resources::rsync_job(token, &dest, "10.96.0.7");
    let job_secret = job
        .spec
        .unwrap()
        .template
        .spec
        .unwrap()
        .volumes
        .unwrap()
        .into_iter()
        .find_map(|v| v.secret)
        .and_then(|s| s.secret_name)
        .unwrap();
    assert_eq!(job_secret, secret_name);
}

#[test]
fn replicated_secrets_share_string_data() {
    // Same-cluster, different namespaces: one bundle materialized twice.
    let bundle = KeyBundle::generate("10.96.0.7").unwrap();
    let in_source = resources::ssh_secret("ab1cd", "ns-1", &bundle);
    let in_dest = resources::ssh_secret("ab1cd", "ns-2", &bundle);

    assert_eq!(in_source.string_data, in_dest.string_data);
    assert_eq!(in_source.metadata.namespace.as_deref(), Some("ns-1"));
    assert_eq!(in_dest.metadata.namespace.as_deref(), Some("ns-2"));
}

#[test]
fn secret_pins_the_server_to_the_resolved_address() {
    let bundle = KeyBundle::generate("203.0.113.9").unwrap();
    let secret = resources::ssh_secret("ab1cd", "ns-1", &bundle);
    let mut data = secret.string_data.unwrap();
    let host_pub = data.remove("host-pub").unwrap();
    assert!(host_pub.starts_with("203.0.113.9 "));
}

#[test]
fn client_command_targets_the_server_mount() {
    let mut dest = claim("ns-2", "pvc-b", false, Exposure::LoadBalancer);
    dest.delete_extraneous_files = true;
    let job = resources::rsync_job("ab1cd", &dest, "203.0.113.9");
    let command = job.spec.unwrap().template.spec.unwrap().containers[0].command.clone().unwrap();
    assert_eq!(command, ["rsync", "--delete", "-avz", "root@203.0.113.9:/source/", "/dest/"]);
}

#[test]
fn objects_land_in_their_claims_namespaces() {
    let token = "ab1cd";
    let source = claim("ns-1", "pvc-a", true, Exposure::ClusterIp);
    let dest = claim("ns-2", "pvc-b", false, Exposure::ClusterIp);

    assert_eq!(
        resources::sshd_service(token, &source).metadata.namespace.as_deref(),
        Some("ns-1")
    );
    assert_eq!(resources::sshd_pod(token, &source).metadata.namespace.as_deref(), Some("ns-1"));
    assert_eq!(
        resources::rsync_job(token, &dest, "10.96.0.7").metadata.namespace.as_deref(),
        Some("ns-2")
    );
}
