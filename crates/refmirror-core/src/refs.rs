//! Reference and refspec types plus the set algebra used to compute prunes.

use std::collections::HashSet;
use std::fmt;

use git2::Oid;
use serde::Serialize;

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// Object id the reference resolves to
    Direct(Oid),
    /// Name of another reference
    Symbolic(String),
}

/// A named pointer into a repository.
///
/// Mirroring decisions compare references by name only; targets are carried
/// for logging and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub target: RefTarget,
}

impl Reference {
    pub fn direct(name: impl Into<String>, oid: Oid) -> Self {
        Self {
            name: name.into(),
            target: RefTarget::Direct(oid),
        }
    }

    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: RefTarget::Symbolic(target.into()),
        }
    }

    /// Name identity; targets are ignored.
    pub fn same_name(&self, other: &Reference) -> bool {
        self.name == other.name
    }

    /// Resolved object id, if this is a direct reference.
    pub fn oid(&self) -> Option<Oid> {
        match self.target {
            RefTarget::Direct(oid) => Some(oid),
            RefTarget::Symbolic(_) => None,
        }
    }
}

/// A `[+]<src>:<dst>` mapping rule. An empty `src` deletes `dst`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefSpec {
    pub src: String,
    pub dst: String,
    pub force: bool,
}

impl RefSpec {
    /// Every reference to the identical name, overwriting non-fast-forwards.
    pub const MIRROR_ALL: &'static str = "+refs/*:refs/*";

    pub fn new(src: impl Into<String>, dst: impl Into<String>, force: bool) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            force,
        }
    }

    /// Force-push `name` onto the same name at the destination.
    pub fn mirror(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, true)
    }

    /// Delete `name` at the destination.
    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(String::new(), name, false)
    }

    pub fn is_delete(&self) -> bool {
        self.src.is_empty()
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force {
            f.write_str("+")?;
        }
        write!(f, "{}:{}", self.src, self.dst)
    }
}

/// References in `have` whose name does not appear among `want`.
///
/// Names are compared byte for byte; order of `have` is preserved.
pub fn difference(have: &[Reference], want: &[Reference]) -> Vec<Reference> {
    let wanted: HashSet<&str> = want.iter().map(|r| r.name.as_str()).collect();
    have.iter()
        .filter(|r| !wanted.contains(r.name.as_str()))
        .cloned()
        .collect()
}

/// One delete refspec per reference, in input order.
pub fn to_delete_refspecs(refs: &[Reference]) -> Vec<RefSpec> {
    refs.iter().map(|r| RefSpec::delete(r.name.clone())).collect()
}

/// Whether `name` starts with any of `prefixes`.
pub fn has_excluded_prefix(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
}
