//! Embedding vectors and the provider boundary.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{MemoryError, MemoryResult};

/// Boxed error type returned by [`EmbeddingProvider`] implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Converts text into a fixed-length embedding.
///
/// Implementations must return an error on any failure. A default or zero
/// vector would silently corrupt similarity search.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds the supplied text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError>;
}

#[async_trait]
impl<T> EmbeddingProvider for Arc<T>
where
    T: EmbeddingProvider + ?Sized,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        (**self).embed(text).await
    }
}

/// Size in bytes of one encoded vector component.
pub(crate) const COMPONENT_BYTES: usize = std::mem::size_of::<f32>();

/// Wrapper type around an immutable floating-point embedding.
#[derive(Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Arc<[f32]>,
}

impl EmbeddingVector {
    /// Creates a new embedding from owned values.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] when the supplied vector is empty
    /// or contains non-finite values.
    pub fn new(values: Vec<f32>) -> MemoryResult<Self> {
        if values.is_empty() {
            return Err(MemoryError::validation("embedding vector must not be empty"));
        }
        if !values.iter().all(|value| value.is_finite()) {
            return Err(MemoryError::validation(
                "embedding vector contains non-finite values",
            ));
        }
        Ok(Self {
            values: Arc::<[f32]>::from(values.into_boxed_slice()),
        })
    }

    /// Creates an embedding by copying the provided slice.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] if the slice is empty or contains
    /// non-finite values.
    pub fn from_slice(values: &[f32]) -> MemoryResult<Self> {
        Self::new(values.to_vec())
    }

    /// Returns an immutable view of the embedding data.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Returns the dimensionality of the embedding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; [`EmbeddingVector::new`] rejects empty inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean norm of the vector.
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        self.values
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt()
    }

    /// Returns a unit-length copy of the vector.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] for the zero vector, which has no
    /// direction.
    pub fn normalized(&self) -> MemoryResult<Self> {
        let magnitude = self.magnitude();
        if magnitude <= f32::EPSILON {
            return Err(MemoryError::validation(
                "embedding vector has zero magnitude and cannot be normalized",
            ));
        }
        Self::new(self.values.iter().map(|value| value / magnitude).collect())
    }

    /// Squared Euclidean (L2²) distance to `other`.
    ///
    /// Callers must ensure both vectors share a dimension.
    #[must_use]
    pub fn squared_distance(&self, other: &[f32]) -> f32 {
        squared_l2(&self.values, other)
    }

    /// Encodes the vector as raw little-endian `f32` components.
    #[must_use]
    pub fn to_le_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len() * COMPONENT_BYTES);
        for value in self.values.iter() {
            buf.put_f32_le(*value);
        }
        buf.freeze()
    }

    /// Decodes raw little-endian `f32` components.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Validation`] when the buffer length is not a
    /// multiple of four bytes or decodes to an invalid vector.
    pub fn from_le_bytes(mut raw: &[u8]) -> MemoryResult<Self> {
        if raw.len() % COMPONENT_BYTES != 0 {
            return Err(MemoryError::validation(format!(
                "encoded embedding has {} bytes, not a multiple of {COMPONENT_BYTES}",
                raw.len()
            )));
        }
        let mut values = Vec::with_capacity(raw.len() / COMPONENT_BYTES);
        while raw.has_remaining() {
            values.push(raw.get_f32_le());
        }
        Self::new(values)
    }
}

pub(crate) fn squared_l2(lhs: &[f32], rhs: &[f32]) -> f32 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(a, b)| {
            let diff = a - b;
            diff * diff
        })
        .sum()
}

impl std::fmt::Debug for EmbeddingVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingVector")
            .field("dimensions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_vectors() {
        let err = EmbeddingVector::new(vec![]).expect_err("empty vector should error");
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = EmbeddingVector::new(vec![1.0, f32::NAN]).expect_err("nan not allowed");
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn normalization_yields_unit_length() {
        let embedding = EmbeddingVector::new(vec![3.0, 4.0]).unwrap();
        let unit = embedding.normalized().unwrap();
        assert!((unit.magnitude() - 1.0).abs() < 1e-6);
        assert!((unit.as_slice()[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_cannot_be_normalized() {
        let zero = EmbeddingVector::new(vec![0.0, 0.0, 0.0]).unwrap();
        let err = zero.normalized().expect_err("zero vector");
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn little_endian_encoding_is_raw_components() {
        let embedding = EmbeddingVector::new(vec![1.0, -2.5]).unwrap();
        let bytes = embedding.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        let decoded = EmbeddingVector::from_le_bytes(&bytes).unwrap();
        assert_eq!(decoded, embedding);
    }

    #[test]
    fn truncated_encoding_is_rejected() {
        let err = EmbeddingVector::from_le_bytes(&[0, 0, 128]).expect_err("3 bytes");
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn squared_distance_of_orthogonal_unit_vectors_is_two() {
        let a = EmbeddingVector::new(vec![1.0, 0.0]).unwrap();
        assert!((a.squared_distance(&[0.0, 1.0]) - 2.0).abs() < f32::EPSILON);
    }
}
