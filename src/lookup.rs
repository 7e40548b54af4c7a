//! Existence checks for resources that are referenced but not built.
//!
//! The build never talks to the platform directly. Callers that have a client pass a
//! [`ResourceLookup`] to the build command; without one every undefined reference is
//! reported as missing.

use crate::loader::{Identifier, LoaderKind};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Lookup of {kind} failed: {message}")]
pub struct LookupError {
    pub kind: LoaderKind,
    pub message: String,
}

/// Answers which of a batch of identifiers already exist remotely.
pub trait ResourceLookup {
    fn retrieve(
        &self,
        loader: LoaderKind,
        ids: &[Identifier],
    ) -> Result<Vec<Identifier>, LookupError>;
}

/// In-memory lookup, for offline builds and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    existing: HashMap<LoaderKind, HashSet<Identifier>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, loader: LoaderKind, identifier: Identifier) -> Self {
        self.existing.entry(loader).or_default().insert(identifier);
        self
    }
}

impl ResourceLookup for StaticLookup {
    fn retrieve(
        &self,
        loader: LoaderKind,
        ids: &[Identifier],
    ) -> Result<Vec<Identifier>, LookupError> {
        let Some(existing) = self.existing.get(&loader) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter(|id| existing.contains(id)).cloned().collect())
    }
}

/// Positive lookup results kept for the rest of one build.
#[derive(Debug, Default)]
pub struct LookupCache {
    found: HashMap<LoaderKind, HashSet<Identifier>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks `lookup` about the identifiers not already known to exist.
    ///
    /// Transport errors are logged and treated as "not found".
    pub fn fetch(&mut self, lookup: &dyn ResourceLookup, loader: LoaderKind, ids: &[Identifier]) {
        let known = self.found.entry(loader).or_default();
        let unknown: Vec<Identifier> =
            ids.iter().filter(|id| !known.contains(id)).cloned().collect();
        if unknown.is_empty() {
            return;
        }
        match lookup.retrieve(loader, &unknown) {
            Ok(existing) => known.extend(existing),
            Err(e) => log::debug!("{e}; treating {} identifier(s) as missing", unknown.len()),
        }
    }

    pub fn exists(&self, loader: LoaderKind, identifier: &Identifier) -> bool {
        self.found.get(&loader).is_some_and(|found| found.contains(identifier))
    }
}
