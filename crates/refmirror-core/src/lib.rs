//! refmirror core library
//!
//! Mirrors every reference of a source git repository to a destination,
//! leaving out excluded reference prefixes and pruning destination references
//! the source no longer has.

pub mod auth;
pub mod config;
pub mod error;
pub mod mirror;
pub mod push;
pub mod refs;
pub mod remote;
pub mod staging;

pub use config::{MirrorConfig, PrunePolicy, SshConfig};
pub use error::{MirrorError, Phase, Result};
pub use mirror::{Mirror, MirrorState, MirrorSummary, mirror};
pub use remote::Transfer;
