//! Serializer and SizeOf contracts
//!
//! The two caller-supplied collaborators the layers are written against.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CacheError, Result};

/// Converts values to and from a textual representation.
///
/// Implementations must satisfy the round-trip law:
/// `deserialize(serialize(v))` behaves like `v`. The cache never checks it.
pub trait CacheSerializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<String>;

    /// Fails with [`CacheError::Deserialization`] on malformed input.
    fn deserialize(&self, data: &str) -> Result<T>;
}

/// Computes the byte footprint of a value held by reference in RAM.
///
/// Must be pure; it is called on every insertion.
pub trait SizeOf<T>: Send + Sync {
    fn size_of(&self, value: &T) -> usize;
}

impl<T, F> SizeOf<T> for F
where
    F: Fn(&T) -> usize + Send + Sync,
{
    fn size_of(&self, value: &T) -> usize {
        self(value)
    }
}

impl<T, S> CacheSerializer<T> for Arc<S>
where
    S: CacheSerializer<T> + ?Sized,
{
    fn serialize(&self, value: &T) -> Result<String> {
        (**self).serialize(value)
    }

    fn deserialize(&self, data: &str) -> Result<T> {
        (**self).deserialize(data)
    }
}

// == JSON Serializer ==
/// serde_json codec for any serde-enabled type.
pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonSerializer")
    }
}

impl<T> CacheSerializer<T> for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize(&self, data: &str) -> Result<T> {
        serde_json::from_str(data).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}
