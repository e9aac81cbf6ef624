//! Error types for a mirror run.

use std::fmt;

/// The step of a mirror run an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Config,
    Staging,
    Fetch,
    Filter,
    Auth,
    Push,
    Prune,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Config => "config",
            Phase::Staging => "staging",
            Phase::Fetch => "fetch",
            Phase::Filter => "filter",
            Phase::Auth => "auth",
            Phase::Push => "push",
            Phase::Prune => "prune",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by a mirror run.
///
/// Every variant knows the [`Phase`] it failed in, so the single terminal
/// error of a run always identifies where it stopped.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("[{phase}] invalid configuration: {message}")]
    Config { phase: Phase, message: String },

    #[error("[{phase}] failed to allocate staging repository: {source}")]
    Allocation {
        phase: Phase,
        #[source]
        source: AllocationSource,
    },

    #[error("[{phase}] failed to configure remote '{remote}': {message}")]
    RemoteConfig {
        phase: Phase,
        remote: String,
        message: String,
    },

    #[error("[{phase}] {context}: {source}")]
    Transport {
        phase: Phase,
        context: String,
        #[source]
        source: git2::Error,
    },

    #[error("[{phase}] {context}: {source}")]
    Storage {
        phase: Phase,
        context: String,
        #[source]
        source: git2::Error,
    },

    #[error("[{phase}] {context}: {message}")]
    Rejected {
        phase: Phase,
        context: String,
        message: String,
    },

    #[error("[{phase}] failed to set up SSH authentication: {message}")]
    AuthSetup { phase: Phase, message: String },

    /// Display comes from the wrapped error, which already carries the phase.
    #[error("{source}")]
    Prune {
        phase: Phase,
        #[source]
        source: Box<MirrorError>,
    },
}

/// Underlying cause of an allocation failure.
#[derive(Debug, thiserror::Error)]
pub enum AllocationSource {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Git(#[from] git2::Error),
}

impl MirrorError {
    /// The phase the run was in when this error occurred.
    pub fn phase(&self) -> Phase {
        match self {
            MirrorError::Config { phase, .. }
            | MirrorError::Allocation { phase, .. }
            | MirrorError::RemoteConfig { phase, .. }
            | MirrorError::Transport { phase, .. }
            | MirrorError::Storage { phase, .. }
            | MirrorError::Rejected { phase, .. }
            | MirrorError::AuthSetup { phase, .. }
            | MirrorError::Prune { phase, .. } => *phase,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        MirrorError::Config {
            phase: Phase::Config,
            message: message.into(),
        }
    }

    pub(crate) fn allocation(source: impl Into<AllocationSource>) -> Self {
        MirrorError::Allocation {
            phase: Phase::Staging,
            source: source.into(),
        }
    }

    pub(crate) fn remote_config(
        phase: Phase,
        remote: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MirrorError::RemoteConfig {
            phase,
            remote: remote.into(),
            message: message.into(),
        }
    }

    pub(crate) fn transport(phase: Phase, context: impl Into<String>, source: git2::Error) -> Self {
        MirrorError::Transport {
            phase,
            context: context.into(),
            source,
        }
    }

    pub(crate) fn storage(phase: Phase, context: impl Into<String>, source: git2::Error) -> Self {
        MirrorError::Storage {
            phase,
            context: context.into(),
            source,
        }
    }

    pub(crate) fn rejected(
        phase: Phase,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MirrorError::Rejected {
            phase,
            context: context.into(),
            message: message.into(),
        }
    }

    pub(crate) fn auth_setup(message: impl Into<String>) -> Self {
        MirrorError::AuthSetup {
            phase: Phase::Auth,
            message: message.into(),
        }
    }

    pub(crate) fn prune(source: MirrorError) -> Self {
        MirrorError::Prune {
            phase: Phase::Prune,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
