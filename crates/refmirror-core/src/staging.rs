//! Ephemeral staging repository that holds the source's references between
//! fetch and push.

use std::cell::Cell;
use std::path::Path;

use git2::{AutotagOption, FetchOptions, FetchPrune, Remote, Repository};
use tempfile::TempDir;

use crate::auth::{AuthMethod, remote_callbacks};
use crate::error::{MirrorError, Phase, Result};
use crate::refs::{RefSpec, RefTarget, Reference, has_excluded_prefix};
use crate::remote::{DST_REMOTE, SRC_REMOTE, Transfer, create_remote, remote_port};

const STAGING_PREFIX: &str = "refmirror-staging-";

/// A bare repository private to one mirror run.
///
/// libgit2 has no in-memory reference store, so the repository lives in a
/// temporary directory that is deleted when this value is dropped.
pub struct StagingRepo {
    // Declared before `dir` so the handle closes before the directory goes.
    repo: Repository,
    dir: TempDir,
}

impl std::fmt::Debug for StagingRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingRepo")
            .field("path", &self.dir.path())
            .finish()
    }
}

impl StagingRepo {
    /// Allocate a fresh, empty staging repository under `temp_root`
    /// (the system temp directory when `None`).
    pub fn create(temp_root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(MirrorError::allocation)?;

        let repo = Repository::init_bare(dir.path()).map_err(MirrorError::allocation)?;
        tracing::debug!(path = %dir.path().display(), "Created staging repository");
        Ok(Self { repo, dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Register the `src` remote, configured to fetch every reference
    /// under its identical name.
    pub fn attach_source(&self, url: &str) -> Result<Remote<'_>> {
        create_remote(
            &self.repo,
            SRC_REMOTE,
            url,
            Some(RefSpec::MIRROR_ALL),
            Phase::Staging,
        )
    }

    /// Register the `dst` remote.
    pub fn attach_destination(&self, url: &str) -> Result<Remote<'_>> {
        create_remote(&self.repo, DST_REMOTE, url, None, Phase::Push)
    }

    /// Fetch every reference of `remote` under its identical name.
    ///
    /// `remote` must come from [`StagingRepo::attach_source`]. The configured
    /// refspec is used rather than passing one, which keeps libgit2 from
    /// also updating remote-tracking references. A fetch that changes nothing
    /// is reported as [`Transfer::UpToDate`].
    pub fn fetch_all(&self, remote: &mut Remote<'_>, auth: Option<&AuthMethod>) -> Result<Transfer> {
        let updated = Cell::new(0usize);
        let mut callbacks = remote_callbacks(auth, remote_port(remote));
        callbacks.update_tips(|name, old, new| {
            tracing::debug!(reference = name, %old, %new, "Fetched reference");
            updated.set(updated.get() + 1);
            true
        });

        let mut options = FetchOptions::new();
        options
            .remote_callbacks(callbacks)
            .download_tags(AutotagOption::None)
            .prune(FetchPrune::Off);

        remote
            .fetch::<&str>(&[], Some(&mut options), None)
            .map_err(|e| MirrorError::transport(Phase::Fetch, "failed to fetch source remote", e))?;

        let stats = remote.stats();
        tracing::debug!(
            objects = stats.received_objects(),
            bytes = stats.received_bytes(),
            "Fetch transfer complete"
        );
        Ok(Transfer::from_count(updated.get()))
    }

    /// All references in the staging repository.
    pub fn references(&self) -> Result<Vec<Reference>> {
        self.references_for(Phase::Staging)
    }

    pub(crate) fn references_for(&self, phase: Phase) -> Result<Vec<Reference>> {
        let iter = self
            .repo
            .references()
            .map_err(|e| MirrorError::storage(phase, "failed to get references", e))?;

        let mut refs = Vec::new();
        for reference in iter {
            let reference =
                reference.map_err(|e| MirrorError::storage(phase, "failed to read reference", e))?;
            let Some(name) = reference.name() else {
                tracing::debug!("Skipping reference with a non UTF-8 name");
                continue;
            };
            let target = match (reference.target(), reference.symbolic_target()) {
                (Some(oid), _) => RefTarget::Direct(oid),
                (None, Some(target)) => RefTarget::Symbolic(target.to_string()),
                (None, None) => continue,
            };
            refs.push(Reference {
                name: name.to_string(),
                target,
            });
        }
        Ok(refs)
    }

    /// Remove every reference whose name starts with one of `prefixes`.
    ///
    /// Returns the removed names. Running it again with the same prefixes
    /// removes nothing.
    pub fn apply_exclusion_filter(&self, prefixes: &[String]) -> Result<Vec<String>> {
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }

        let excluded: Vec<String> = self
            .references_for(Phase::Filter)?
            .into_iter()
            .map(|r| r.name)
            .filter(|name| has_excluded_prefix(name, prefixes))
            .collect();

        for name in &excluded {
            self.repo
                .find_reference(name)
                .and_then(|mut reference| reference.delete())
                .map_err(|e| {
                    MirrorError::storage(Phase::Filter, format!("failed to remove reference {name}"), e)
                })?;
            tracing::debug!(reference = %name, "Excluded reference");
        }
        Ok(excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Oid;

    fn staging_with_refs(names: &[&str]) -> (TempDir, StagingRepo) {
        let root = TempDir::new().unwrap();
        let staging = StagingRepo::create(Some(root.path())).unwrap();
        let oid = empty_commit(staging.repository());
        for name in names {
            staging.repository().reference(name, oid, true, "test").unwrap();
        }
        (root, staging)
    }

    fn empty_commit(repo: &Repository) -> Oid {
        let tree = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(None, &sig, &sig, "init", &tree, &[]).unwrap()
    }

    fn names(staging: &StagingRepo) -> Vec<String> {
        let mut names: Vec<String> = staging
            .references()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn create_is_empty_and_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let staging = StagingRepo::create(Some(root.path())).unwrap();
        let path = staging.path().to_path_buf();
        assert!(staging.repository().is_bare());
        assert!(staging.references().unwrap().is_empty());
        drop(staging);
        assert!(!path.exists());
    }

    #[test]
    fn filter_removes_pull_request_refs() {
        let (_root, staging) =
            staging_with_refs(&["refs/heads/main", "refs/pull/1/head", "refs/pull/2/merge"]);
        let mut removed = staging
            .apply_exclusion_filter(&["refs/pull".to_string()])
            .unwrap();
        removed.sort();
        assert_eq!(removed, vec!["refs/pull/1/head", "refs/pull/2/merge"]);
        assert_eq!(names(&staging), vec!["refs/heads/main"]);
    }

    #[test]
    fn filter_is_idempotent() {
        let (_root, staging) = staging_with_refs(&["refs/heads/main", "refs/pull/1/head"]);
        let prefixes = vec!["refs/pull".to_string()];
        staging.apply_exclusion_filter(&prefixes).unwrap();
        let once = names(&staging);
        let removed = staging.apply_exclusion_filter(&prefixes).unwrap();
        assert!(removed.is_empty());
        assert_eq!(names(&staging), once);
    }

    #[test]
    fn filter_with_no_prefixes_is_noop() {
        let (_root, staging) = staging_with_refs(&["refs/heads/main", "refs/pull/1/head"]);
        assert!(staging.apply_exclusion_filter(&[]).unwrap().is_empty());
        assert_eq!(names(&staging).len(), 2);
    }

    #[test]
    fn filter_honours_every_prefix() {
        let (_root, staging) = staging_with_refs(&[
            "refs/heads/main",
            "refs/pull/1/head",
            "refs/changes/01/1/1",
            "refs/tags/v1",
        ]);
        staging
            .apply_exclusion_filter(&["refs/pull".to_string(), "refs/changes/".to_string()])
            .unwrap();
        assert_eq!(names(&staging), vec!["refs/heads/main", "refs/tags/v1"]);
    }

    #[test]
    fn remotes_are_attached_once() {
        let root = TempDir::new().unwrap();
        let staging = StagingRepo::create(Some(root.path())).unwrap();
        staging.attach_source("/srv/src.git").unwrap();
        assert!(staging.attach_source("/srv/other.git").is_err());
        let dst = staging.attach_destination("/srv/dst.git").unwrap();
        assert_eq!(dst.name(), Some(DST_REMOTE));
    }

    #[test]
    fn attach_rejects_invalid_url() {
        let root = TempDir::new().unwrap();
        let staging = StagingRepo::create(Some(root.path())).unwrap();
        let Err(err) = staging.attach_source("") else {
            panic!("empty URL was accepted");
        };
        assert!(matches!(err, MirrorError::RemoteConfig { .. }));
        assert_eq!(err.phase(), Phase::Staging);
    }
}
