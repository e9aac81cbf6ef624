//! Mirror run orchestration.
//!
//! A run moves through a fixed sequence of states:
//!
//! `Start → StagingCreated → SourceAttached → Fetched → Filtered →
//! DestinationAttached → Pushed → Pruned → Done`
//!
//! The first fatal error stops the run and leaves it in `Failed`. Nothing is
//! rolled back: a run that pushed but failed to prune stays pushed.

use serde::Serialize;

use crate::auth::resolve_auth;
use crate::config::{MirrorConfig, PrunePolicy};
use crate::error::{MirrorError, Phase, Result};
use crate::push::{prune_destination, push_mirror};
use crate::remote::Transfer;
use crate::staging::StagingRepo;

/// Where a run currently is.
///
/// SSH material is resolved before the staging repository is created, so an
/// auth setup failure moves straight from `Start` to `Failed(Phase::Auth)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Start,
    StagingCreated,
    SourceAttached,
    Fetched,
    Filtered,
    DestinationAttached,
    Pushed,
    Pruned,
    Done,
    Failed(Phase),
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorSummary {
    pub fetched: Transfer,
    pub excluded: Vec<String>,
    pub pushed: Transfer,
    pub pruned: Vec<String>,
    /// Prune failure tolerated under [`PrunePolicy::BestEffort`]
    pub prune_error: Option<String>,
}

/// One mirror run from a source to a destination repository.
#[derive(Debug)]
pub struct Mirror {
    config: MirrorConfig,
    state: MirrorState,
}

impl Mirror {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            state: MirrorState::Start,
        }
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Execute the run. Each `Mirror` runs at most once.
    pub fn run(&mut self) -> Result<MirrorSummary> {
        if self.state != MirrorState::Start {
            return Err(MirrorError::config(format!(
                "mirror run already executed (state {:?})",
                self.state
            )));
        }

        let result = self.execute();
        if let Err(ref err) = result {
            self.advance(MirrorState::Failed(err.phase()));
        }
        result
    }

    fn execute(&mut self) -> Result<MirrorSummary> {
        self.config.validate()?;
        let config = self.config.clone();
        let temp_root = config.temp_dir.as_deref();

        // Lives until the end of the run; drops any temporary known_hosts file.
        let auth = resolve_auth(&config.ssh, temp_root)?;

        tracing::info!("Setting up a staging git repository");
        let staging = StagingRepo::create(temp_root)?;
        self.advance(MirrorState::StagingCreated);

        let mut src = staging.attach_source(&config.src_repo)?;
        self.advance(MirrorState::SourceAttached);

        tracing::info!(source = %config.src_repo, "Fetching all refs");
        let fetched = staging.fetch_all(&mut src, auth.as_ref())?;
        if fetched.is_up_to_date() {
            tracing::info!("Staging repository already up to date");
        }
        self.advance(MirrorState::Fetched);

        let excluded = staging.apply_exclusion_filter(&config.exclude_prefixes)?;
        if !excluded.is_empty() {
            tracing::info!(count = excluded.len(), "Excluded references from the mirror");
        }
        self.advance(MirrorState::Filtered);

        let mut dst = staging.attach_destination(&config.dst_repo)?;
        self.advance(MirrorState::DestinationAttached);

        tracing::info!(destination = %config.dst_repo, "Pushing to destination");
        let pushed = push_mirror(&staging, &mut dst, auth.as_ref())?;
        if pushed.is_up_to_date() {
            tracing::info!("Destination already up to date");
        } else {
            tracing::info!("Pushed all references to destination");
        }
        self.advance(MirrorState::Pushed);

        let mut pruned = Vec::new();
        let mut prune_error = None;
        match config.prune {
            PrunePolicy::Off => tracing::debug!("Pruning disabled"),
            policy => {
                tracing::info!("Pruning the destination");
                match prune_destination(&staging, &mut dst, auth.as_ref()) {
                    Ok(names) if names.is_empty() => {
                        tracing::info!("Destination has nothing to prune");
                    }
                    Ok(names) => {
                        tracing::info!(count = names.len(), "Pruned destination references");
                        pruned = names;
                    }
                    Err(err) if policy == PrunePolicy::BestEffort => {
                        tracing::warn!(error = %err, "Pruning failed, mirror push already succeeded");
                        prune_error = Some(err.to_string());
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        self.advance(MirrorState::Pruned);
        self.advance(MirrorState::Done);

        Ok(MirrorSummary {
            fetched,
            excluded,
            pushed,
            pruned,
            prune_error,
        })
    }

    fn advance(&mut self, next: MirrorState) {
        tracing::debug!(from = ?self.state, to = ?next, "Mirror state transition");
        self.state = next;
    }
}

/// Mirror `config.src_repo` to `config.dst_repo`.
pub fn mirror(config: MirrorConfig) -> Result<MirrorSummary> {
    Mirror::new(config).run()
}
