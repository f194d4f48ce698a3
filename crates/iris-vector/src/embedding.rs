//! Embedding backends mapping images and text into one vector space.
//!
//! - `ClipEmbedder` loads CLIP vision and text ONNX encoders via ort and
//!   tokenizes with the HuggingFace tokenizers crate. This is the production
//!   backend.
//! - `MockEmbedder` provides deterministic hash-based vectors for tests and
//!   local development without model files.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection,
    TruncationParams, TruncationStrategy,
};
use tracing::info;

use iris_core::config::EmbeddingConfig;
use iris_core::error::{IrisError, Result};

/// CLIP text context length; queries are padded/truncated to this.
const CLIP_CONTEXT_LENGTH: usize = 77;

/// Per-channel normalization constants used by the CLIP image preprocessor.
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Dimension of vectors produced by [`MockEmbedder`].
pub const MOCK_DIMENSION: usize = 512;

/// Service mapping both input modalities into one fixed-dimension space.
///
/// Implementations must be deterministic and side-effect-free given
/// identical input; callers never retry an embed.
pub trait Embedder: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed_text(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>>> + Send;

    /// Generate an embedding vector for the given image.
    fn embed_image(
        &self,
        image: DynamicImage,
    ) -> impl std::future::Future<Output = Result<Vec<f32>>> + Send;

    /// Dimension this backend declares for its vectors, when it knows one.
    ///
    /// Backends that cannot declare a dimension return `None`; the startup
    /// sequence then probes with a sentinel embed via [`resolve_dimension`].
    fn declared_dimension(&self) -> Option<usize>;
}

/// Object-safe version of [`Embedder`] for dynamic dispatch.
///
/// Because `Embedder`'s methods return `impl Future` the trait is not
/// object-safe. This trait uses boxed futures instead, allowing
/// `Arc<dyn DynEmbedder>` to be stored in service structs without generics.
///
/// A blanket implementation is provided so that every `Embedder`
/// automatically implements `DynEmbedder`.
pub trait DynEmbedder: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_text_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + 'a>>;

    /// Generate an embedding vector for the given image (boxed future).
    fn embed_image_boxed(
        &self,
        image: DynamicImage,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>>;

    /// Dimension this backend declares for its vectors, when it knows one.
    fn declared_dimension(&self) -> Option<usize>;
}

impl<T: Embedder> DynEmbedder for T {
    fn embed_text_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + 'a>> {
        Box::pin(self.embed_text(text))
    }

    fn embed_image_boxed(
        &self,
        image: DynamicImage,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>> {
        Box::pin(self.embed_image(image))
    }

    fn declared_dimension(&self) -> Option<usize> {
        Embedder::declared_dimension(self)
    }
}

/// Determine the embedding dimension once at startup.
///
/// Prefers the backend's declared dimension; otherwise embeds a sentinel
/// text and measures the result. A failure here is fatal to startup: the
/// collection cannot be configured without a dimension.
pub async fn resolve_dimension(embedder: &dyn DynEmbedder) -> Result<usize> {
    if let Some(dimension) = embedder.declared_dimension() {
        return Ok(dimension);
    }
    let probe = embedder.embed_text_boxed("test").await.map_err(|e| {
        IrisError::Embedding(format!("failed to probe embedding dimension: {}", e))
    })?;
    if probe.is_empty() {
        return Err(IrisError::Embedding(
            "probe embedding was empty; cannot determine dimension".to_string(),
        ));
    }
    Ok(probe.len())
}

// ---------------------------------------------------------------------------
// ClipEmbedder - CLIP vision + text encoders via ONNX Runtime
// ---------------------------------------------------------------------------

/// CLIP-backed embedder with separate vision and text encoder sessions.
///
/// Expects projection-head ONNX exports: the vision encoder takes one NCHW
/// `pixel_values` tensor and emits a `[1, D]` image embedding; the text
/// encoder takes `input_ids` and `attention_mask` and emits a `[1, D]` text
/// embedding. Outputs are L2-normalized so cosine ranking is well-behaved.
#[derive(Clone)]
pub struct ClipEmbedder {
    vision: Arc<Mutex<Session>>,
    text: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    input_resolution: u32,
    dimension: Option<usize>,
}

// ort::Session is Send + Sync internally (uses Arc<SharedSessionInner>).
unsafe impl Send for ClipEmbedder {}
unsafe impl Sync for ClipEmbedder {}

impl std::fmt::Debug for ClipEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipEmbedder")
            .field("input_resolution", &self.input_resolution)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl ClipEmbedder {
    /// Load the vision encoder, text encoder, and tokenizer named in the
    /// configuration from its model directory.
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        let model_dir = Path::new(&config.model_dir);
        let vision_path = model_dir.join(&config.vision_model);
        let text_path = model_dir.join(&config.text_model);
        let tokenizer_path = model_dir.join(&config.tokenizer);

        for path in [&vision_path, &text_path, &tokenizer_path] {
            if !path.exists() {
                return Err(IrisError::Embedding(format!(
                    "model file not found at {}",
                    path.display()
                )));
            }
        }

        let vision = Session::builder()
            .map_err(|e| IrisError::Embedding(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| IrisError::Embedding(format!("ONNX set threads: {}", e)))?
            .commit_from_file(&vision_path)
            .map_err(|e| IrisError::Embedding(format!("ONNX load vision model: {}", e)))?;

        let text = Session::builder()
            .map_err(|e| IrisError::Embedding(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| IrisError::Embedding(format!("ONNX set threads: {}", e)))?
            .commit_from_file(&text_path)
            .map_err(|e| IrisError::Embedding(format!("ONNX load text model: {}", e)))?;

        // Prefer an explicitly configured dimension, then the vision model's
        // declared output shape. A dynamic (non-positive) dimension leaves
        // this as None and the startup probe takes over.
        let dimension = config.dimension.or_else(|| {
            vision
                .outputs()
                .first()
                .and_then(|out| out.dtype().tensor_shape())
                .and_then(|shape| shape.last().copied())
                .and_then(|d| if d > 0 { Some(d as usize) } else { None })
        });

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| IrisError::Embedding(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(CLIP_CONTEXT_LENGTH),
            direction: PaddingDirection::Right,
            pad_to_multiple_of: None,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: "[PAD]".to_string(),
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: CLIP_CONTEXT_LENGTH,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| {
                IrisError::Embedding(format!("Failed to apply truncation config: {}", e))
            })?;

        info!(
            vision = %vision_path.display(),
            text = %text_path.display(),
            dimension = ?dimension,
            "Loaded CLIP embedding models"
        );

        Ok(Self {
            vision: Arc::new(Mutex::new(vision)),
            text: Arc::new(Mutex::new(text)),
            tokenizer: Arc::new(tokenizer),
            input_resolution: config.input_resolution,
            dimension,
        })
    }

    /// Tokenize and run the text encoder.
    fn embed_text_sync(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| IrisError::Embedding(format!("Tokenization failed: {}", e)))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let seq_len = input_ids.len();

        let ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| IrisError::Embedding(format!("input_ids array: {}", e)))?;
        let mask_array = Array2::from_shape_vec((1, seq_len), attention_mask)
            .map_err(|e| IrisError::Embedding(format!("attention_mask array: {}", e)))?;

        let ids_ref = TensorRef::from_array_view(&ids_array)
            .map_err(|e| IrisError::Embedding(format!("TensorRef input_ids: {}", e)))?;
        let mask_ref = TensorRef::from_array_view(&mask_array)
            .map_err(|e| IrisError::Embedding(format!("TensorRef attention_mask: {}", e)))?;

        let mut session = self
            .text
            .lock()
            .map_err(|e| IrisError::Embedding(format!("Session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![ids_ref, mask_ref])
            .map_err(|e| IrisError::Embedding(format!("Text inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| IrisError::Embedding(format!("Extract text embedding: {}", e)))?;
        finalize_embedding(&shape.iter().copied().collect::<Vec<i64>>(), data)
    }

    /// Preprocess and run the vision encoder.
    fn embed_image_sync(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let pixel_values = self.preprocess_image(image);

        let pixels_ref = TensorRef::from_array_view(&pixel_values)
            .map_err(|e| IrisError::Embedding(format!("TensorRef pixel_values: {}", e)))?;

        let mut session = self
            .vision
            .lock()
            .map_err(|e| IrisError::Embedding(format!("Session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![pixels_ref])
            .map_err(|e| IrisError::Embedding(format!("Vision inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| IrisError::Embedding(format!("Extract image embedding: {}", e)))?;
        finalize_embedding(&shape.iter().copied().collect::<Vec<i64>>(), data)
    }

    /// Prepare an image for CLIP inference.
    ///
    /// Resize the shortest edge to the model resolution preserving aspect
    /// ratio, center-crop to a square, and emit NCHW f32 with the CLIP
    /// per-channel mean/std normalization.
    fn preprocess_image(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.input_resolution;
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();

        let scale = size as f32 / w.min(h).max(1) as f32;
        let new_w = ((w as f32) * scale).round().max(1.0) as u32;
        let new_h = ((h as f32) * scale).round().max(1.0) as u32;
        let resized = image::imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

        let start_x = (resized.width().saturating_sub(size)) / 2;
        let start_y = (resized.height().saturating_sub(size)) / 2;

        let mut array = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for y in 0..size as usize {
            for x in 0..size as usize {
                let pixel = resized.get_pixel(
                    (start_x + x as u32).min(resized.width() - 1),
                    (start_y + y as u32).min(resized.height() - 1),
                );
                for c in 0..3 {
                    array[[0, c, y, x]] = (pixel[c] as f32 / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
                }
            }
        }
        array
    }
}

impl Embedder for ClipEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        // ONNX inference is CPU-bound; run on a blocking thread.
        let embedder = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embedder.embed_text_sync(&text))
            .await
            .map_err(|e| IrisError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    async fn embed_image(&self, image: DynamicImage) -> Result<Vec<f32>> {
        let embedder = self.clone();
        tokio::task::spawn_blocking(move || embedder.embed_image_sync(&image))
            .await
            .map_err(|e| IrisError::Embedding(format!("Embedding task panicked: {}", e)))?
    }

    fn declared_dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// Validate the raw encoder output and L2-normalize it.
fn finalize_embedding(shape: &[i64], data: &[f32]) -> Result<Vec<f32>> {
    if shape.len() < 2 {
        return Err(IrisError::Embedding(format!(
            "Unexpected output shape: {:?}",
            shape
        )));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(IrisError::Embedding(
            "Embedding contains non-finite values".to_string(),
        ));
    }
    Ok(l2_normalize(data))
}

/// L2 normalize a vector (unit length). Zero vectors are returned unchanged.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

// ---------------------------------------------------------------------------
// MockEmbedder - deterministic hash-based vectors
// ---------------------------------------------------------------------------

/// Mock embedder returning deterministic 512-dimensional unit vectors.
///
/// The output is derived from a hash of the input, so identical inputs
/// always produce identical vectors. Text and image inputs hash into
/// disjoint regions of the space so the two modalities never collide.
/// Empty text is embedded like any other input.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder;

impl MockEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(modality: u8, seed: &[u8]) -> Vec<f32> {
        let mut result = Vec::with_capacity(MOCK_DIMENSION);
        for i in 0..MOCK_DIMENSION {
            let mut hasher = DefaultHasher::new();
            modality.hash(&mut hasher);
            seed.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }
        l2_normalize(&result)
    }
}

impl Embedder for MockEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::hash_to_vector(0, text.as_bytes()))
    }

    async fn embed_image(&self, image: DynamicImage) -> Result<Vec<f32>> {
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();
        let mut seed = Vec::with_capacity(rgb.as_raw().len() + 8);
        seed.extend_from_slice(&w.to_le_bytes());
        seed.extend_from_slice(&h.to_le_bytes());
        seed.extend_from_slice(rgb.as_raw());
        Ok(Self::hash_to_vector(1, &seed))
    }

    fn declared_dimension(&self) -> Option<usize> {
        Some(MOCK_DIMENSION)
    }
}
