/// External model collaborators
///
/// The pipeline only talks to models through the two traits below. Real
/// inference runs in external programs (`command`), recorded answers can be
/// replayed (`canned`), and `placeholder` fetches a stand-in image when the
/// user supplies none.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::frame::{FrameError, ImageFrame};
use crate::segmentation::rle_decoder::{decode_rle, encode_rle, RleMask};
use crate::segmentation::{ScoredMask, SegmentPrompt, SegmentationResult};

pub mod canned;
pub mod command;
pub mod placeholder;

/// Any failure of an external model call. Never retried.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("no {0} program configured")]
    NotConfigured(&'static str),
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Exited {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode image for transfer: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unusable image: {0}")]
    Frame(#[from] FrameError),
}

/// Output bounds for text generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    /// Generation ends at this marker; nothing after it is returned
    pub stop_string: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: config::DEFAULT_MAX_NEW_TOKENS,
            stop_string: config::DEFAULT_STOP_STRING.to_string(),
        }
    }
}

impl GenerationConfig {
    /// Everything before the first stop marker, otherwise byte-for-byte unchanged
    pub fn apply_stop(&self, text: &str) -> String {
        if self.stop_string.is_empty() {
            return text.to_string();
        }
        text.split(self.stop_string.as_str()).next().unwrap_or(text).to_string()
    }
}

/// A vision-language model answering a prompt about an image.
///
/// Blocking; may take seconds.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, image: &ImageFrame, prompt: &str, config: &GenerationConfig) -> Result<String, CollaboratorError>;
}

/// A promptable segmentation model.
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: &ImageFrame, prompt: &SegmentPrompt) -> Result<SegmentationResult, CollaboratorError>;
}

/// JSON answer of a segmentation program: one RLE mask per score
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SegmenterResponse {
    pub masks: Vec<RleMask>,
    pub scores: Vec<f32>,
}

impl SegmenterResponse {
    pub fn from_json(bytes: &[u8]) -> Result<Self, CollaboratorError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Re-encode decoded masks, the shape a segmentation program would print
    pub fn from_result(result: &SegmentationResult) -> Self {
        Self {
            masks: result.candidates.iter().map(|c| encode_rle(&c.mask)).collect(),
            scores: result.candidates.iter().map(|c| c.score).collect(),
        }
    }

    /// Decode every mask and pair it with its score (unranked).
    ///
    /// Every mask must be `width` x `height`; sizes are checked before any
    /// mask memory is allocated.
    pub fn to_result(&self, width: u32, height: u32) -> Result<SegmentationResult, CollaboratorError> {
        if self.masks.len() != self.scores.len() {
            return Err(CollaboratorError::Malformed(format!(
                "{} masks but {} scores",
                self.masks.len(),
                self.scores.len()
            )));
        }

        if let Some((i, rle)) = self
            .masks
            .iter()
            .enumerate()
            .find(|(_, rle)| rle.size[..] != [height, width])
        {
            return Err(CollaboratorError::Malformed(format!(
                "mask {} has size {:?} but the image is {}x{} (expected [{}, {}])",
                i, rle.size, width, height, height, width
            )));
        }

        let candidates = self
            .masks
            .iter()
            .zip(self.scores.iter().copied())
            .enumerate()
            .map(|(i, (rle, score))| {
                decode_rle(rle)
                    .map(|mask| ScoredMask { mask, score })
                    .map_err(|e| CollaboratorError::Malformed(format!("mask {}: {}", i, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SegmentationResult::new(candidates))
    }
}
