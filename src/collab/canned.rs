/// Recorded collaborator answers
///
/// Used to replay a saved model answer through the rest of the pipeline
/// without running inference, and as test doubles.
use std::fs;
use std::path::Path;

use log::info;

use super::{CollaboratorError, GenerationConfig, Segmenter, SegmenterResponse, TextGenerator};
use crate::frame::ImageFrame;
use crate::segmentation::{SegmentPrompt, SegmentationResult};

/// Answers every prompt with the same text
#[derive(Debug, Clone)]
pub struct CannedTextGenerator {
    response: String,
}

impl CannedTextGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CollaboratorError> {
        let path = path.as_ref();
        let response = fs::read_to_string(path)?;
        info!("Replaying model output from {}", path.display());
        Ok(Self::new(response))
    }
}

impl TextGenerator for CannedTextGenerator {
    fn generate(&self, _image: &ImageFrame, _prompt: &str, config: &GenerationConfig) -> Result<String, CollaboratorError> {
        Ok(config.apply_stop(&self.response))
    }
}

/// Answers every prompt with the same masks.
///
/// Masks stay encoded until [`Segmenter::segment`] knows the image size, so a
/// recorded answer for a different image fails there instead of being decoded.
#[derive(Debug, Clone)]
pub struct CannedSegmenter {
    response: SegmenterResponse,
}

impl CannedSegmenter {
    #[cfg(test)]
    pub fn new(result: SegmentationResult) -> Self {
        Self {
            response: SegmenterResponse::from_result(&result),
        }
    }

    /// Load a recorded segmentation program answer (see [`SegmenterResponse`])
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CollaboratorError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let response = SegmenterResponse::from_json(&bytes)?;
        info!("Replaying {} mask(s) from {}", response.masks.len(), path.display());
        Ok(Self { response })
    }
}

impl Segmenter for CannedSegmenter {
    fn segment(&self, image: &ImageFrame, _prompt: &SegmentPrompt) -> Result<SegmentationResult, CollaboratorError> {
        self.response.to_result(image.width(), image.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_canned_text_applies_stop() {
        let generator = CannedTextGenerator::new("answer<|endoftext|>rest");
        let image = ImageFrame::filled(1, 1, [0, 0, 0]).unwrap();
        let text = generator.generate(&image, "anything", &GenerationConfig::default()).unwrap();
        assert_eq!(text, "answer");
    }

    #[test]
    fn test_canned_from_files() {
        let mut text_file = tempfile::NamedTempFile::new().unwrap();
        write!(text_file, r#"<point x="10" y="20">cat</point>"#).unwrap();
        let generator = CannedTextGenerator::from_file(text_file.path()).unwrap();
        assert_eq!(generator.response, r#"<point x="10" y="20">cat</point>"#);

        let mut mask_file = tempfile::NamedTempFile::new().unwrap();
        write!(mask_file, r#"{{"masks":[{{"size":[1,2],"counts":[1,1]}}],"scores":[0.9]}}"#).unwrap();
        let segmenter = CannedSegmenter::from_file(mask_file.path()).unwrap();
        let image = ImageFrame::filled(2, 1, [0, 0, 0]).unwrap();
        let result = segmenter.segment(&image, &SegmentPrompt::default()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.candidates[0].mask.dimensions(), (2, 1));
        assert_eq!(result.candidates[0].score, 0.9);

        assert!(matches!(
            CannedTextGenerator::from_file("/nonexistent/pointseg/answer.txt"),
            Err(CollaboratorError::Io(_))
        ));
    }

    #[test]
    fn test_recorded_masks_for_another_image_are_rejected() {
        let mut mask_file = tempfile::NamedTempFile::new().unwrap();
        write!(mask_file, r#"{{"masks":[{{"size":[4294967295,4294967295],"counts":[]}}],"scores":[0.5]}}"#).unwrap();
        let segmenter = CannedSegmenter::from_file(mask_file.path()).unwrap();

        let image = ImageFrame::filled(4, 4, [0, 0, 0]).unwrap();
        assert!(matches!(
            segmenter.segment(&image, &SegmentPrompt::default()),
            Err(CollaboratorError::Malformed(_))
        ));
    }
}
