//! Builders for the ephemeral cluster objects.
//!
//! All builders are pure: they take the instance token and resolved claim
//! info and return fully formed manifests. Creation happens in the
//! orchestrator so the shapes stay unit-testable without a cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, KeyToPath, PersistentVolumeClaimVolumeSource, Pod, PodSpec,
    PodTemplateSpec, Secret, SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::claim::ClaimInfo;
use crate::instance::{self, Component};
use crate::keys::KeyBundle;

const SSHD_IMAGE: &str = "docker.io/utkuozdemir/pv-migrate-sshd:v0.1.0";
const RSYNC_IMAGE: &str = "docker.io/utkuozdemir/pv-migrate-rsync:v0.1.0";

/// Path inside the sshd pod where the source volume is mounted.
pub const SOURCE_MOUNT_PATH: &str = "/source";

/// Path inside the rsync pod where the destination volume is mounted.
pub const DEST_MOUNT_PATH: &str = "/dest";

const SSH_PORT: i32 = 22;
const JOB_TTL_SECONDS: i32 = 600;
const KEY_FILE_MODE: i32 = 0o600;

/// The sshd service, exposing port 22 of the server pod under the exposure
/// mode resolved for this migration.
pub fn sshd_service(instance: &str, source: &ClaimInfo) -> Service {
    let labels = instance::labels(Component::Sshd, instance);
    Service {
        metadata: ObjectMeta {
            name: Some(instance::sshd_name(instance)),
            namespace: Some(source.claim.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(source.exposure.service_type().to_string()),
            ports: Some(vec![ServicePort {
                port: SSH_PORT,
                target_port: Some(IntOrString::Int(SSH_PORT)),
                ..Default::default()
            }]),
            selector: Some(labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The SSH key secret. The same content is created in the source namespace
/// and, for cross-namespace or cross-cluster migrations, in the destination
/// namespace.
pub fn ssh_secret(instance: &str, namespace: &str, bundle: &KeyBundle) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(instance::secret_name(instance)),
            namespace: Some(namespace.to_string()),
            labels: Some(instance::labels(Component::Sshd, instance)),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([
            ("host-key".to_string(), bundle.host_key.clone()),
            ("host-pub".to_string(), bundle.host_pub.clone()),
            ("user-key".to_string(), bundle.user_key.clone()),
            ("user-pub".to_string(), bundle.user_pub.clone()),
        ])),
        ..Default::default()
    }
}

/// The transient sshd server pod, pinned to the source claim's owner node.
pub fn sshd_pod(instance: &str, source: &ClaimInfo) -> Pod {
    let name = instance::sshd_name(instance);
    Pod {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(source.claim.namespace.clone()),
            labels: Some(instance::labels(Component::Sshd, instance)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            volumes: Some(vec![claim_volume("source-vol", source), ssh_keys_volume(instance)]),
            containers: vec![Container {
                name: "app".to_string(),
                image: Some(SSHD_IMAGE.to_string()),
                image_pull_policy: Some("Always".to_string()),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: "source-vol".to_string(),
                        mount_path: SOURCE_MOUNT_PATH.to_string(),
                        read_only: Some(source.read_only),
                        ..Default::default()
                    },
                    key_mount("host-key", "/etc/ssh/ssh_host_ecdsa_key"),
                    key_mount("user-pub", "/root/.ssh/authorized_keys"),
                ]),
                ports: Some(vec![ContainerPort {
                    container_port: SSH_PORT,
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            node_name: source.owner_node.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The one-shot rsync client job. Backoff limit zero keeps the failure model
/// simple; the TTL lets the cluster garbage-collect the job if cleanup never
/// runs.
pub fn rsync_job(instance: &str, dest: &ClaimInfo, address: &str) -> Job {
    let name = instance::rsync_name(instance);
    Job {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(dest.claim.namespace.clone()),
            labels: Some(instance::labels(Component::Rsync, instance)),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(JOB_TTL_SECONDS),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(name),
                    namespace: Some(dest.claim.namespace.clone()),
                    labels: Some(instance::labels(Component::Rsync, instance)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    volumes: Some(vec![claim_volume("dest-vol", dest), ssh_keys_volume(instance)]),
                    containers: vec![Container {
                        name: "app".to_string(),
                        image: Some(RSYNC_IMAGE.to_string()),
                        image_pull_policy: Some("Always".to_string()),
                        command: Some(rsync_command(dest, address)),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: "dest-vol".to_string(),
                                mount_path: DEST_MOUNT_PATH.to_string(),
                                read_only: Some(dest.read_only),
                                ..Default::default()
                            },
                            key_mount("user-key", "/root/.ssh/id_ecdsa"),
                            key_mount("host-pub", "/root/.ssh/known_hosts"),
                        ]),
                        ..Default::default()
                    }],
                    node_name: dest.owner_node.clone(),
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The transfer command line. Trailing slashes are significant: they make
/// rsync copy directory contents rather than the directories themselves.
pub fn rsync_command(dest: &ClaimInfo, address: &str) -> Vec<String> {
    let mut command = vec!["rsync".to_string()];
    if dest.delete_extraneous_files {
        command.push("--delete".to_string());
    }
    command.push("-avz".to_string());
    command.push(format!("root@{address}:{SOURCE_MOUNT_PATH}/"));
    command.push(format!("{DEST_MOUNT_PATH}/"));
    command
}

fn claim_volume(name: &str, info: &ClaimInfo) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: info.claim.name.clone(),
            read_only: Some(info.read_only),
        }),
        ..Default::default()
    }
}

fn ssh_keys_volume(instance: &str) -> Volume {
    let item = |key: &str| KeyToPath {
        key: key.to_string(),
        path: key.to_string(),
        mode: Some(KEY_FILE_MODE),
    };
    Volume {
        name: "ssh-keys".to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(instance::secret_name(instance)),
            items: Some(vec![item("user-key"), item("user-pub"), item("host-pub"), item("host-key")]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn key_mount(sub_path: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: "ssh-keys".to_string(),
        mount_path: mount_path.to_string(),
        sub_path: Some(sub_path.to_string()),
        read_only: Some(true),
        ..Default::default()
    }
}
