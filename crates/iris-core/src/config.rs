use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Top-level configuration for the iris service.
///
/// Loaded from `iris.toml` by default. Each section corresponds to one
/// subsystem of the indexing and retrieval pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrisConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl IrisConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IrisConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// API server port.
    pub port: u16,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            log_level: "info".to_string(),
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory of images indexed once at startup. The folder name becomes
    /// the prefix of every stored payload path and the matching static mount.
    pub source_dir: String,
    /// Secondary image directory exposed read-only over HTTP. Never written
    /// to or indexed by this service.
    pub image_root: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: "unstracted".to_string(),
            image_root: "images".to_string(),
        }
    }
}

/// Which embedding backend to construct at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// ONNX CLIP vision + text encoders.
    #[default]
    Clip,
    /// Deterministic hash-based vectors. Development and tests only.
    Mock,
}

/// Embedding model settings.
///
/// The CLIP backend expects projection-head ONNX exports (the vision encoder
/// emitting one `[1, D]` image embedding, the text encoder taking
/// `input_ids` and `attention_mask`), e.g. the Xenova
/// `clip-vit-base-patch32` exports, plus the matching `tokenizer.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend selection.
    pub backend: EmbeddingBackend,
    /// Directory containing the model files below.
    pub model_dir: String,
    /// Vision encoder ONNX file name.
    pub vision_model: String,
    /// Text encoder ONNX file name.
    pub text_model: String,
    /// Tokenizer JSON file name.
    pub tokenizer: String,
    /// Declared embedding dimension. When unset, the dimension is read from
    /// the vision model's output shape, or probed with a sentinel embed.
    pub dimension: Option<usize>,
    /// Input resolution the vision encoder was trained for.
    pub input_resolution: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Clip,
            model_dir: "models".to_string(),
            vision_model: "vision_model.onnx".to_string(),
            text_model: "text_model.onnx".to_string(),
            tokenizer: "tokenizer.json".to_string(),
            dimension: None,
            input_resolution: 224,
        }
    }
}

/// Vector collection storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the collection snapshot.
    pub data_dir: String,
    /// Collection name; also the snapshot file stem.
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "storage".to_string(),
            collection: "images".to_string(),
        }
    }
}
