//! pv-migrate core library.
//!
//! The migration orchestrator and its collaborators: claim resolution,
//! ephemeral key material, manifest builders, readiness watching, and
//! cleanup. The CLI crate builds the cluster clients and the request; this
//! crate does everything else.

pub mod claim;
pub mod cleanup;
pub mod error;
pub mod instance;
pub mod keys;
pub mod orchestrator;
pub mod resources;
pub mod watch;

// Re-export commonly used items
pub use claim::{ClaimInfo, ClaimRef, Exposure};
pub use error::{MigrateError, Result};
pub use keys::KeyBundle;
pub use orchestrator::{MigrationRequest, Migrator};
