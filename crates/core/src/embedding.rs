//! Vector ingress decoding.
//!
//! Collaborators hand embeddings over in whatever shape their model client
//! produced: single-precision arrays, double-precision arrays, or a
//! base64-encoded little-endian float64 blob. Storage only ever deals in the
//! canonical form, `Vec<f32>` of the configured dimension.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An embedding as supplied by a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorInput {
    /// Canonical single-precision array
    F32(Vec<f32>),
    /// Double-precision array (narrowed on ingress)
    F64(Vec<f64>),
    /// Base64-encoded little-endian float64 blob
    Base64(String),
}

impl VectorInput {
    /// Convert to the canonical form without a dimension check.
    pub fn into_f32(self) -> Result<Vec<f32>> {
        match self {
            Self::F32(v) => Ok(v),
            Self::F64(v) => Ok(v.into_iter().map(|x| x as f32).collect()),
            Self::Base64(encoded) => {
                let bytes = BASE64
                    .decode(encoded.as_bytes())
                    .map_err(|e| Error::serialization(format!("invalid base64 vector: {e}")))?;
                if bytes.len() % 8 != 0 {
                    return Err(Error::serialization(format!(
                        "base64 vector blob length {} is not a multiple of 8",
                        bytes.len()
                    )));
                }
                Ok(bytes
                    .chunks_exact(8)
                    .map(|chunk| {
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(chunk);
                        f64::from_le_bytes(raw) as f32
                    })
                    .collect())
            }
        }
    }

    /// Convert to the canonical form, enforcing the configured dimension.
    pub fn into_dimensioned_f32(self, dimension: usize) -> Result<Vec<f32>> {
        let vector = self.into_f32()?;
        check_dimension(&vector, dimension)?;
        Ok(vector)
    }
}

impl From<Vec<f32>> for VectorInput {
    fn from(v: Vec<f32>) -> Self {
        Self::F32(v)
    }
}

impl From<Vec<f64>> for VectorInput {
    fn from(v: Vec<f64>) -> Self {
        Self::F64(v)
    }
}

/// Fail with [`Error::DimensionMismatch`] unless the vector has exactly the
/// configured length.
pub fn check_dimension(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}
