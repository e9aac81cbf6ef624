//! Pushing the staged references to the destination and pruning what the
//! source no longer has.

use std::cell::{Cell, RefCell};

use git2::{Direction, PushOptions, Remote};

use crate::auth::{AuthMethod, remote_callbacks};
use crate::error::{MirrorError, Phase, Result};
use crate::refs::{RefSpec, Reference, difference, to_delete_refspecs};
use crate::remote::{Transfer, remote_port};
use crate::staging::StagingRepo;

/// Force-push every staged reference to the same name on `remote`.
///
/// The transport's own prune is never used; stale destination references are
/// removed by [`prune_destination`] as a separate push.
pub fn push_mirror(
    staging: &StagingRepo,
    remote: &mut Remote<'_>,
    auth: Option<&AuthMethod>,
) -> Result<Transfer> {
    let refspecs: Vec<String> = staging
        .references_for(Phase::Push)?
        .iter()
        .map(|r| RefSpec::mirror(r.name.as_str()).to_string())
        .collect();

    if refspecs.is_empty() {
        return Ok(Transfer::UpToDate);
    }

    push_refspecs(
        remote,
        auth,
        &refspecs,
        Phase::Push,
        "failed to push to destination",
    )
}

/// List the references `remote` currently advertises.
///
/// Only names under `refs/` are returned; `HEAD` and peeled tag entries are
/// dropped. Every call goes to the network.
pub fn list_remote(remote: &mut Remote<'_>, auth: Option<&AuthMethod>) -> Result<Vec<Reference>> {
    let callbacks = remote_callbacks(auth, remote_port(remote));
    let connection = remote
        .connect_auth(Direction::Push, Some(callbacks), None)
        .map_err(|e| MirrorError::transport(Phase::Prune, "failed to connect to the destination remote", e))?;

    let heads = connection
        .list()
        .map_err(|e| MirrorError::transport(Phase::Prune, "failed to list the destination remote", e))?;

    Ok(heads
        .iter()
        .filter(|head| head.name().starts_with("refs/") && !head.name().ends_with("^{}"))
        .map(|head| Reference::direct(head.name(), head.oid()))
        .collect())
}

/// Delete every destination reference that is not in the staging repository.
///
/// Returns the pruned names. Nothing is pushed when there is nothing to prune.
/// The destination listing is taken fresh, so references created there after
/// the mirror push are pruned as well.
pub fn prune_destination(
    staging: &StagingRepo,
    remote: &mut Remote<'_>,
    auth: Option<&AuthMethod>,
) -> Result<Vec<String>> {
    let destination = list_remote(remote, auth).map_err(MirrorError::prune)?;
    let staged = staging
        .references_for(Phase::Prune)
        .map_err(MirrorError::prune)?;

    let stale = difference(&destination, &staged);
    if stale.is_empty() {
        return Ok(Vec::new());
    }

    let refspecs: Vec<String> = to_delete_refspecs(&stale)
        .iter()
        .map(ToString::to_string)
        .collect();
    tracing::debug!(?refspecs, "Pruning destination references");

    push_refspecs(
        remote,
        auth,
        &refspecs,
        Phase::Prune,
        "failed to push prune refspecs",
    )
    .map_err(MirrorError::prune)?;

    Ok(stale.into_iter().map(|r| r.name).collect())
}

/// Push `refspecs` and turn per-reference rejections into an error.
fn push_refspecs(
    remote: &mut Remote<'_>,
    auth: Option<&AuthMethod>,
    refspecs: &[String],
    phase: Phase,
    context: &str,
) -> Result<Transfer> {
    let changed = Cell::new(0usize);
    let rejected = RefCell::new(Vec::new());

    let mut callbacks = remote_callbacks(auth, remote_port(remote));
    callbacks.push_negotiation(|updates| {
        let count = updates.iter().filter(|u| u.src() != u.dst()).count();
        changed.set(count);
        Ok(())
    });
    callbacks.push_update_reference(|name, status| {
        if let Some(message) = status {
            rejected.borrow_mut().push(format!("{name}: {message}"));
        }
        Ok(())
    });

    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);

    remote
        .push(refspecs, Some(&mut options))
        .map_err(|e| MirrorError::transport(phase, context, e))?;
    drop(options);

    let rejected = rejected.into_inner();
    if !rejected.is_empty() {
        return Err(MirrorError::rejected(phase, context, rejected.join("; ")));
    }
    Ok(Transfer::from_count(changed.get()))
}

