//! Constraint-narrowing sets for hidden attributes
//!
//! A [`PossibilitySet`] tracks everything a hidden attribute (ability, item)
//! could still be. It only ever shrinks: narrowing intersects, removal
//! subtracts, and an operation that would leave the set empty is rejected
//! because it means our beliefs contradict the observed events.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossibilitySet {
    /// Human-readable label for error messages, e.g. "Gyarados ability".
    label: String,
    values: BTreeSet<String>,
}

impl PossibilitySet {
    pub fn new<I, S>(label: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PossibilitySet {
            label: label.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn possible(&self) -> &BTreeSet<String> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains(name)
    }

    /// The single remaining value, if fully resolved.
    pub fn definite(&self) -> Option<&str> {
        if self.values.len() == 1 {
            self.values.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    pub fn is_definite(&self) -> bool {
        self.values.len() == 1
    }

    /// Intersect with `keep`. Errors if nothing would remain.
    pub fn narrow<'a, I>(&mut self, keep: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: BTreeSet<&str> = keep.into_iter().collect();
        let narrowed: BTreeSet<String> = self
            .values
            .iter()
            .filter(|v| keep.contains(v.as_str()))
            .cloned()
            .collect();

        if narrowed.is_empty() {
            return Err(InferenceError::EmptyPossibilities {
                what: self.label.clone(),
            });
        }
        if narrowed.len() < self.values.len() {
            tracing::debug!(label = %self.label, remaining = narrowed.len(), "narrowed possibilities");
        }
        self.values = narrowed;
        Ok(())
    }

    /// Resolve to exactly `name`. Errors if `name` was already ruled out.
    pub fn narrow_to(&mut self, name: &str) -> Result<()> {
        self.narrow([name])
    }

    /// Rule out `name`. Removing an already-absent value is a no-op; removing
    /// the last value is an error.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        if !self.values.contains(name) {
            return Ok(());
        }
        if self.values.len() == 1 {
            return Err(InferenceError::EmptyPossibilities {
                what: self.label.clone(),
            });
        }
        self.values.remove(name);
        tracing::debug!(label = %self.label, ruled_out = name, "removed possibility");
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}
