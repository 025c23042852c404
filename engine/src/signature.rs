// signature.rs — Serializable operator signature
//
// Everything an `ArgumentEngine` is built from: declared providers, stencils,
// tiling descriptors and engine options, as one JSON document.
//
// Preconditions: none.
// Postconditions: a `Signature` that passed `validate` has unique provider
//                 names, unique tiling block dimensions, and declared parents
//                 for every derived dimension.
// Failure modes: I/O, malformed JSON and validation failures → `SignatureError`.
// Side effects: `load` reads one file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{ArgumentEngine, EngineOptions};
use crate::provider::Provider;
use crate::stencil::Stencil;
use crate::tiling::TilingArgument;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed signature: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid signature: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signature {
    pub parameters: Vec<Provider>,
    #[serde(default)]
    pub stencils: Vec<Stencil>,
    #[serde(default)]
    pub tiling: Vec<TilingArgument>,
    #[serde(default)]
    pub options: EngineOptions,
}

impl Signature {
    pub fn load(path: &Path) -> Result<Self, SignatureError> {
        let text = std::fs::read_to_string(path).map_err(|source| SignatureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate.
    pub fn from_json(text: &str) -> Result<Self, SignatureError> {
        let signature: Signature = serde_json::from_str(text)?;
        signature.validate()?;
        Ok(signature)
    }

    pub fn validate(&self) -> Result<(), SignatureError> {
        let mut names = HashSet::new();
        for provider in &self.parameters {
            if !names.insert(provider.name()) {
                return Err(SignatureError::Invalid(format!(
                    "parameter '{}' declared more than once",
                    provider.name()
                )));
            }
        }

        for dim in self.parameters.iter().filter_map(Provider::as_dimension) {
            if let Some(parent) = dim.parent() {
                let declared = self
                    .parameters
                    .iter()
                    .filter_map(Provider::as_dimension)
                    .any(|d| d.name == parent);
                if !declared {
                    return Err(SignatureError::Invalid(format!(
                        "dimension '{}' derives from undeclared dimension '{}'",
                        dim.name, parent
                    )));
                }
            }
        }

        let mut blocked = HashSet::new();
        for tiling in &self.tiling {
            if !blocked.insert(tiling.argument.as_str()) {
                return Err(SignatureError::Invalid(format!(
                    "block dimension '{}' has more than one tiling descriptor",
                    tiling.argument
                )));
            }
        }
        Ok(())
    }

    pub fn into_engine(self) -> ArgumentEngine {
        ArgumentEngine::with_options(&self.stencils, self.parameters, self.tiling, self.options)
    }

    /// Compact JSON with fields in declaration order.
    pub fn canonical_json(&self) -> Result<String, SignatureError> {
        Ok(serde_json::to_string(self)?)
    }

    /// SHA-256 of `canonical_json()`, usable as an engine cache key.
    pub fn fingerprint(&self) -> Result<[u8; 32], SignatureError> {
        use sha2::{Digest, Sha256};

        let canonical = self.canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Ok(hash)
    }

    /// Hex string of the fingerprint (64 characters).
    pub fn fingerprint_hex(&self) -> Result<String, SignatureError> {
        Ok(bytes_to_hex(&self.fingerprint()?))
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}
