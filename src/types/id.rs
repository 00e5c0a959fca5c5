// ABOUTME: Phantom-typed identifiers for deployments and pipeline requests.
// ABOUTME: Keeps a deployment id from being passed where a request id is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
pub enum DeploymentMarker {}
pub enum RequestMarker {}

/// A string identifier tagged with the kind of thing it names.
#[must_use = "ids name deployments and requests and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Id<DeploymentMarker> {
    /// Fresh random deployment id.
    pub fn generate() -> Self {
        Self::new(format!("d-{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Id<RequestMarker> {
    /// Request id for callers that do not carry one from the pipeline.
    pub fn generate() -> Self {
        Self::new(format!("r-{}", uuid::Uuid::new_v4().simple()))
    }
}

// Manual impls so T needs no bounds; it only exists at the type level.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

pub type DeploymentId = Id<DeploymentMarker>;
pub type RequestId = Id<RequestMarker>;
