//! Versioned data containers exchanged between tasks.
//!
//! A [`DataNode`] holds an opaque JSON payload together with a
//! [`Fingerprint`] derived from the payload and its upstream lineage.
//! Fingerprints drive change detection: two data nodes with equal
//! fingerprints are interchangeable for caching purposes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::types::DataNodeId;

/// Content fingerprint of a data node.
///
/// Computed as a blake3 hash over the canonical JSON encoding of the value
/// followed by the ordered fingerprints of the producing task's inputs
/// (the lineage). `serde_json` maps are sorted, so the encoding is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from a value and its upstream lineage.
    pub fn compute(value: &Value, lineage: &[Fingerprint]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(value.to_string().as_bytes());
        for upstream in lineage {
            hasher.update(upstream.0.as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Fingerprint of a source value with no lineage.
    pub fn of_value(value: &Value) -> Self {
        Self::compute(value, &[])
    }

    /// Get the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, versioned data container consumed and produced by tasks.
///
/// Data nodes are created when a scenario is built. Only the task that owns
/// a node as output may write it; consumers only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataNode {
    id: DataNodeId,
    value: Value,
    fingerprint: Fingerprint,
}

impl DataNode {
    /// Create a source data node from an initial value (no lineage).
    pub fn new(id: impl Into<DataNodeId>, value: Value) -> Self {
        let fingerprint = Fingerprint::of_value(&value);
        Self {
            id: id.into(),
            value,
            fingerprint,
        }
    }

    /// Get the node id.
    pub fn id(&self) -> &DataNodeId {
        &self.id
    }

    /// Read the current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Get the current fingerprint.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Write a freshly produced value, refreshing the fingerprint from the
    /// producing task's input lineage.
    ///
    /// Must only be called by the executor on behalf of the producing task.
    pub fn write(&mut self, value: Value, lineage: &[Fingerprint]) {
        self.fingerprint = Fingerprint::compute(&value, lineage);
        self.value = value;
    }

    /// Install a cached value together with the fingerprint recorded when it
    /// was originally produced.
    pub fn write_cached(&mut self, value: Value, fingerprint: Fingerprint) {
        self.value = value;
        self.fingerprint = fingerprint;
    }
}
