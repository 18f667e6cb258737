//! Model artifact persistence and the shared model handle

use crate::error::{DetectorError, Result};
use crate::models::network::{Autoencoder, Dense};
use bincode::Options;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const ARTIFACT_MAGIC: [u8; 4] = *b"FAE1";
const ARTIFACT_VERSION: u32 = 1;

/// Upper bound on artifact size. The fixed topology encodes to a few KiB.
const MAX_ARTIFACT_BYTES: u64 = 64 * 1024;

fn artifact_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_ARTIFACT_BYTES)
}

/// On-disk representation of a trained model. Layer shapes travel with
/// the weights, so nothing else is needed to load it.
#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    magic: [u8; 4],
    version: u32,
    layers: Vec<Dense>,
}

/// Serialize a model into an artifact blob.
pub fn to_bytes(model: &Autoencoder) -> Result<Vec<u8>> {
    let artifact = ModelArtifact {
        magic: ARTIFACT_MAGIC,
        version: ARTIFACT_VERSION,
        layers: model.layers().to_vec(),
    };
    artifact_options()
        .serialize(&artifact)
        .map_err(|e| DetectorError::ModelArtifact(e.to_string()))
}

/// Deserialize and validate an artifact blob.
pub fn from_bytes(data: &[u8]) -> Result<Autoencoder> {
    let artifact: ModelArtifact = artifact_options()
        .deserialize(data)
        .map_err(|e| DetectorError::ModelArtifact(e.to_string()))?;

    if artifact.magic != ARTIFACT_MAGIC {
        return Err(DetectorError::ModelArtifact("unrecognized artifact header".to_string()));
    }
    if artifact.version != ARTIFACT_VERSION {
        return Err(DetectorError::ModelArtifact(format!(
            "unsupported artifact version {}",
            artifact.version
        )));
    }

    Autoencoder::from_layers(artifact.layers).map_err(DetectorError::ModelArtifact)
}

/// Write a trained model to `path`, creating parent directories.
pub fn save_model<P: AsRef<Path>>(model: &Autoencoder, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let bytes = to_bytes(model)?;
    fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "Model artifact saved");
    Ok(())
}

/// Load a model artifact from `path`.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Autoencoder> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let model = from_bytes(&bytes)?;
    info!(path = %path.display(), "Model artifact loaded");
    Ok(model)
}

/// Shared, swappable reference to the current model.
///
/// Readers take an `Arc` snapshot and keep using it even if a new model is
/// swapped in meanwhile; a model is never mutated once published.
#[derive(Debug, Default)]
pub struct ModelHandle {
    current: RwLock<Option<Arc<Autoencoder>>>,
}

impl ModelHandle {
    /// Handle with no model; scoring fails until one is installed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_model(model: Autoencoder) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(model))),
        }
    }

    /// Handle pinned to an existing snapshot.
    pub fn from_shared(model: Arc<Autoencoder>) -> Self {
        Self {
            current: RwLock::new(Some(model)),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_model(load_model(path)?))
    }

    /// Snapshot of the current model.
    pub fn current(&self) -> Result<Arc<Autoencoder>> {
        self.current
            .read()
            .as_ref()
            .cloned()
            .ok_or(DetectorError::ModelUnavailable)
    }

    /// Publish a fully built model, returning the one it replaces.
    pub fn swap(&self, model: Autoencoder) -> Option<Arc<Autoencoder>> {
        let replaced = self.current.write().replace(Arc::new(model));
        info!(replaced = replaced.is_some(), "Model swapped in");
        replaced
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model(seed: u64) -> Autoencoder {
        Autoencoder::initialize(&mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("autoencoder.bin");

        let original = model(1);
        save_model(&original, &path).unwrap();
        let loaded = load_model(&path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            from_bytes(b"not a model"),
            Err(DetectorError::ModelArtifact(_))
        ));

        let mut bytes = to_bytes(&model(1)).unwrap();
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(DetectorError::ModelArtifact(_))));
    }

    #[test]
    fn test_rejects_oversized_length_prefix() {
        let mut forged = ARTIFACT_MAGIC.to_vec();
        forged.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
        forged.extend_from_slice(&u64::MAX.to_le_bytes());

        assert!(matches!(from_bytes(&forged), Err(DetectorError::ModelArtifact(_))));
    }

    #[test]
    fn test_artifact_fits_size_limit() {
        let bytes = to_bytes(&model(3)).unwrap();
        assert!((bytes.len() as u64) < MAX_ARTIFACT_BYTES);
        assert_eq!(from_bytes(&bytes).unwrap(), model(3));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_model("/nonexistent/autoencoder.bin"),
            Err(DetectorError::Io(_))
        ));
    }

    #[test]
    fn test_empty_handle_is_unavailable() {
        let handle = ModelHandle::empty();
        assert!(!handle.is_loaded());
        assert!(matches!(handle.current(), Err(DetectorError::ModelUnavailable)));
    }

    #[test]
    fn test_swap_keeps_in_flight_snapshot() {
        let handle = ModelHandle::with_model(model(1));
        let in_flight = handle.current().unwrap();

        let replaced = handle.swap(model(2));
        assert!(Arc::ptr_eq(&replaced.unwrap(), &in_flight));

        // The old snapshot is untouched; new readers see the new model.
        assert_eq!(*in_flight, model(1));
        assert_eq!(*handle.current().unwrap(), model(2));
    }
}
