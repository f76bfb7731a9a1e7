//! Run-scoped naming: the instance token, object names, and label sets.
//!
//! Every ephemeral object a run creates carries the label set
//! `{app: pv-migrate, component: <sshd|rsync>, instance: <token>}`. The token
//! is the only piece of shared state between a run and its cleanup, so names
//! and selectors are derived here and nowhere else.

use std::collections::BTreeMap;

use rand::rngs::OsRng;
use rand::Rng;

/// Value of the `app` label on every created object.
pub const APP: &str = "pv-migrate";

const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LEN: usize = 5;

/// Which half of the transfer an object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The transient SSH server next to the source volume.
    Sshd,
    /// The one-shot rsync client next to the destination volume.
    Rsync,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Sshd => "sshd",
            Component::Rsync => "rsync",
        }
    }
}

/// Draw a fresh instance token from the OS random source.
///
/// Distinct tokens keep concurrent invocations on the same claims from
/// colliding; cleanup finds a run's objects by this token alone.
pub fn generate_token() -> String {
    let mut rng = OsRng;
    (0..TOKEN_LEN).map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char).collect()
}

/// Name of the sshd pod and its service.
pub fn sshd_name(instance: &str) -> String {
    format!("pv-migrate-sshd-{instance}")
}

/// Name of the rsync job.
pub fn rsync_name(instance: &str) -> String {
    format!("pv-migrate-rsync-{instance}")
}

/// Name of the SSH key secret (same name in both namespaces).
pub fn secret_name(instance: &str) -> String {
    format!("pv-migrate-{instance}")
}

/// Full label set stamped on every object a run creates.
pub fn labels(component: Component, instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP.to_string()),
        ("component".to_string(), component.as_str().to_string()),
        ("instance".to_string(), instance.to_string()),
    ])
}

/// Selector matching every object of one run, regardless of component.
pub fn instance_selector(instance: &str) -> String {
    format!("app={APP},instance={instance}")
}
