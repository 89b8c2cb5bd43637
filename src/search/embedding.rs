//! Embedding model contract and the bundled Harmonic Token Projection model
//!
//! The engine treats the model as a black box: text in, unit vector out.
//! [`ModelHandle`] loads it lazily, at most once per process, and serializes
//! calls into models that are not reentrant.
//!
//! The bundled model is based on:
//! "Harmonic Token Projection: A Vocabulary-Free, Training-Free,
//!  Deterministic, and Reversible Embedding Methodology"
//! https://arxiv.org/html/2511.20665

use parking_lot::Mutex;
use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

use crate::error::{IndexError, Result};

/// Identifier of the bundled HTP model, persisted alongside every index it builds
pub const HTP_MODEL_NAME: &str = "htp-384";

/// Embedding dimension (2 * number of coprime moduli)
pub const EMBEDDING_DIM: usize = 384;

const NUM_MODULI: usize = EMBEDDING_DIM / 2;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// First NUM_MODULI primes, coprime by construction
static COPRIME_MODULI: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151,
    157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227, 229, 233,
    239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313, 317,
    331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503,
    509, 521, 523, 541, 547, 557, 563, 569, 571, 577, 587, 593, 599, 601, 607,
    613, 617, 619, 631, 641, 643, 647, 653, 659, 661, 673, 677, 683, 691, 701,
    709, 719, 727, 733, 739, 743, 751, 757, 761, 769, 773, 787, 797, 809, 811,
    821, 823, 827, 829, 839, 853, 857, 859, 863, 877, 881, 883, 887, 907, 911,
    919, 929, 937, 941, 947, 953, 967, 971, 977, 983, 991, 997, 1009, 1013,
    1019, 1021, 1031, 1033, 1039, 1049, 1051, 1061, 1063, 1069, 1087, 1091,
    1093, 1097, 1103, 1109, 1117, 1123, 1129, 1151, 1153, 1163, 1171, 1181,
];

/// An L2-normalized embedding, tagged with the model that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Vec<f32>,
    model: Arc<str>,
}

impl EmbeddingVector {
    /// Normalize `values` to unit length. An all-zero vector stays zero
    /// and scores 0 against everything.
    pub fn normalized(mut values: Vec<f32>, model: &str) -> Self {
        let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        Self {
            values,
            model: Arc::from(model),
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Text to unit-vector model
pub trait EmbeddingModel: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Deterministic for a fixed model version; one vector per input text.
    fn encode(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>>;

    /// Models that cannot take concurrent `encode` calls return false and
    /// get serialized by [`ModelHandle`].
    fn is_reentrant(&self) -> bool {
        false
    }
}

pub type ModelLoader = Box<dyn Fn() -> Result<Arc<dyn EmbeddingModel>> + Send + Sync>;

/// Process-wide, lazily loaded embedding model
pub struct ModelHandle {
    name: String,
    loader: ModelLoader,
    loaded: OnceLock<std::result::Result<Arc<dyn EmbeddingModel>, String>>,
    encode_gate: Mutex<()>,
}

impl ModelHandle {
    pub fn new(name: impl Into<String>, loader: ModelLoader) -> Self {
        Self {
            name: name.into(),
            loader,
            loaded: OnceLock::new(),
            encode_gate: Mutex::new(()),
        }
    }

    /// Handle over the bundled HTP model
    pub fn harmonic() -> Self {
        Self::new(
            HTP_MODEL_NAME,
            Box::new(|| Ok(Arc::new(HarmonicEmbedder::new()) as Arc<dyn EmbeddingModel>)),
        )
    }

    /// Handle over an already constructed model
    pub fn from_model(model: Arc<dyn EmbeddingModel>) -> Self {
        let name = model.name().to_string();
        Self::new(name, Box::new(move || Ok(Arc::clone(&model))))
    }

    /// Configured model identifier, known without loading the model
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the model on first use. A failed load is remembered and reported
    /// to every later caller.
    pub fn model(&self) -> Result<Arc<dyn EmbeddingModel>> {
        let loaded = self.loaded.get_or_init(|| {
            info!(model = %self.name, "loading embedding model");
            (self.loader)().map_err(|e| {
                error!(model = %self.name, error = %e, "embedding model failed to load");
                e.to_string()
            })
        });
        match loaded {
            Ok(model) => Ok(Arc::clone(model)),
            Err(msg) => Err(IndexError::ModelUnavailable(msg.clone())),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded.get(), Some(Ok(_)))
    }

    pub fn encode(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        let model = self.model()?;
        let vectors = if model.is_reentrant() {
            model.encode(texts)?
        } else {
            let _gate = self.encode_gate.lock();
            model.encode(texts)?
        };

        if vectors.len() != texts.len() {
            return Err(IndexError::ModelOutput(format!(
                "{} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.dimension() != model.dimension()) {
            return Err(IndexError::DimensionMismatch {
                expected: model.dimension(),
                actual: bad.dimension(),
            });
        }
        Ok(vectors)
    }

    pub fn encode_one(&self, text: &str) -> Result<EmbeddingVector> {
        self.encode(&[text])?
            .pop()
            .ok_or_else(|| IndexError::ModelOutput("no vector for query".to_string()))
    }
}

/// Deterministic, training-free HTP embedder
///
/// Each token is read as a base-2^16 integer, reduced modulo a set of
/// coprime moduli, and each residue projected onto the unit circle.
/// Token vectors are mean-pooled and normalized.
pub struct HarmonicEmbedder {
    moduli: Vec<u64>,
}

impl HarmonicEmbedder {
    pub fn new() -> Self {
        Self {
            moduli: COPRIME_MODULI[..NUM_MODULI].to_vec(),
        }
    }

    fn embed(&self, text: &str) -> EmbeddingVector {
        let tokens = tokenize(text);
        let mut pooled = vec![0.0f64; EMBEDDING_DIM];

        for token in &tokens {
            let n = token_to_integer(token);
            for (i, &m) in self.moduli.iter().enumerate() {
                let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
                pooled[2 * i] += theta.sin();
                pooled[2 * i + 1] += theta.cos();
            }
        }

        // Mean pooling does not change direction; normalization absorbs it.
        let values = pooled.into_iter().map(|x| x as f32).collect();
        EmbeddingVector::normalized(values, HTP_MODEL_NAME)
    }
}

impl Default for HarmonicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for HarmonicEmbedder {
    fn name(&self) -> &str {
        HTP_MODEL_NAME
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

/// N = Σ u_j * B^(L-j) with B = 2^16, wrapping on overflow
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

/// Lowercased words split on whitespace and ASCII punctuation
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Inner product of two equal-length vectors; cosine similarity for unit vectors
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
