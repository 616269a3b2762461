/// Request pipeline: ask the model, extract its points, optionally segment, draw.
///
/// An [`Orchestrator`] owns its collaborators and renderer and holds no
/// per-request state, so one instance can serve concurrent callers as long as
/// each brings its own frame. Every stage runs to completion before the next
/// starts and nothing is retried.
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::collab::{CollaboratorError, GenerationConfig, Segmenter, TextGenerator};
use crate::coords::{self, InvalidDimension, PixelPoint, RawPoint};
use crate::frame::ImageFrame;
use crate::overlay::{OverlayRenderer, RenderError};
use crate::segmentation::{BoxPrompt, LabeledPoint, SegmentPrompt, SegmentationResult};
use crate::utils::timing::{ScopedTimer, TimingStats};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model call failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    InvalidDimension(#[from] InvalidDimension),
    #[error("segmentation needs at least one point, but the model output contained none")]
    NoPoints,
    #[error("failed to draw result: {0}")]
    Render(#[from] RenderError),
}

/// Which demo pipeline to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Draw the model's points on the image
    Point,
    /// Prompt a segmentation model with the points and draw its best mask
    Segment,
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub rendered: ImageFrame,
    /// Model answer, exactly as the text collaborator returned it
    pub model_output: String,
    pub raw_points: Vec<RawPoint>,
    pub points: Vec<PixelPoint>,
    /// Ranked masks (segmentation variant only)
    pub segmentation: Option<SegmentationResult>,
    pub timings: Vec<TimingStats>,
}

impl PipelineOutput {
    /// The (rendered image, model text) pair shown to the user
    pub fn into_parts(self) -> (ImageFrame, String) {
        (self.rendered, self.model_output)
    }
}

pub struct Orchestrator {
    generator: Box<dyn TextGenerator>,
    segmenter: Option<Box<dyn Segmenter>>,
    renderer: OverlayRenderer,
    generation: GenerationConfig,
    bbox: Option<BoxPrompt>,
}

impl Orchestrator {
    /// Point variant: model -> parse -> normalize -> draw points
    pub fn pointing(generator: Box<dyn TextGenerator>, renderer: OverlayRenderer) -> Self {
        Self {
            generator,
            segmenter: None,
            renderer,
            generation: GenerationConfig::default(),
            bbox: None,
        }
    }

    /// Segmentation variant: model -> parse -> normalize -> segment -> draw best mask
    pub fn segmenting(
        generator: Box<dyn TextGenerator>,
        segmenter: Box<dyn Segmenter>,
        renderer: OverlayRenderer,
    ) -> Self {
        Self {
            generator,
            segmenter: Some(segmenter),
            renderer,
            generation: GenerationConfig::default(),
            bbox: None,
        }
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Box prompt sent to the segmenter and drawn on the result
    pub fn with_box(mut self, bbox: BoxPrompt) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn variant(&self) -> Variant {
        match self.segmenter {
            Some(_) => Variant::Segment,
            None => Variant::Point,
        }
    }

    pub fn run(&self, image: ImageFrame, prompt: &str) -> Result<PipelineOutput, PipelineError> {
        info!(
            "Running {:?} pipeline on {}x{} image, prompt: {:?}",
            self.variant(),
            image.width(),
            image.height(),
            prompt
        );

        let mut generate_stats = TimingStats::new("Text generation");
        let model_output = {
            let _timer = ScopedTimer::new(&mut generate_stats);
            self.generator.generate(&image, prompt, &self.generation)?
        };
        debug!("Model output: {}", model_output);

        let raw_points = coords::parse(&model_output);
        let points = coords::normalize_for(&raw_points, &image)?;
        if points.is_empty() {
            warn!("No points found in model output");
        } else {
            info!("Model pointed at {} location(s): {:?}", points.len(), points);
        }

        let mut timings = vec![generate_stats];

        let (rendered, segmentation) = match &self.segmenter {
            None => {
                let mut render_stats = TimingStats::new("Render points");
                let rendered = {
                    let _timer = ScopedTimer::new(&mut render_stats);
                    self.renderer.render(&image, &points, None)?
                };
                timings.push(render_stats);
                (rendered, None)
            }
            Some(segmenter) => {
                if points.is_empty() {
                    return Err(PipelineError::NoPoints);
                }

                let seg_prompt = SegmentPrompt {
                    points: points.iter().copied().map(LabeledPoint::positive).collect(),
                    bbox: self.bbox,
                };

                let mut segment_stats = TimingStats::new("Segmentation");
                let result = {
                    let _timer = ScopedTimer::new(&mut segment_stats);
                    segmenter.segment(&image, &seg_prompt)?.ranked()
                };
                timings.push(segment_stats);

                if let Some((index, (w, h))) = result.first_mismatch(image.width(), image.height()) {
                    return Err(CollaboratorError::Malformed(format!(
                        "mask {} is {}x{} but the image is {}x{}",
                        index,
                        w,
                        h,
                        image.width(),
                        image.height()
                    ))
                    .into());
                }
                if let Some(best) = result.best() {
                    info!("{} mask(s), best score {:.3}", result.len(), best.score);
                } else {
                    warn!("Segmenter returned no masks");
                }

                let mut render_stats = TimingStats::new("Render segmentation");
                let rendered = {
                    let _timer = ScopedTimer::new(&mut render_stats);
                    self.renderer.render_segmentation(&image, &result, &seg_prompt)?
                };
                timings.push(render_stats);
                (rendered, Some(result))
            }
        };

        Ok(PipelineOutput {
            rendered,
            model_output,
            raw_points,
            points,
            segmentation,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::collab::canned::{CannedSegmenter, CannedTextGenerator};
    use crate::segmentation::{Mask, ScoredMask};

    struct FailingGenerator;

    impl TextGenerator for FailingGenerator {
        fn generate(&self, _: &ImageFrame, _: &str, _: &GenerationConfig) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Malformed("out of memory".to_string()))
        }
    }

    /// Remembers the prompt it was called with
    #[derive(Default, Clone)]
    struct RecordingSegmenter {
        seen: Arc<Mutex<Vec<SegmentPrompt>>>,
        result: SegmentationResult,
    }

    impl Segmenter for RecordingSegmenter {
        fn segment(&self, _: &ImageFrame, prompt: &SegmentPrompt) -> Result<SegmentationResult, CollaboratorError> {
            self.seen.lock().unwrap().push(prompt.clone());
            Ok(self.result.clone())
        }
    }

    fn gray(width: u32, height: u32) -> ImageFrame {
        ImageFrame::filled(width, height, [90, 90, 90]).unwrap()
    }

    fn square_mask(width: u32, height: u32, from: u32, to: u32) -> Mask {
        let mut mask = Mask::new(width, height);
        for y in from..to {
            for x in from..to {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn test_point_pipeline_end_to_end() {
        let answer = r#" <point x="45.3" y="60.1" alt="dog">dog</point>"#;
        let orchestrator = Orchestrator::pointing(
            Box::new(CannedTextGenerator::new(answer)),
            OverlayRenderer::default(),
        );

        let output = orchestrator.run(gray(200, 100), "Point at the dog.").unwrap();
        assert_eq!(output.raw_points, vec![RawPoint::new(45.3, 60.1)]);
        assert_eq!(output.points, vec![PixelPoint::new(90, 60)]);
        assert_eq!(output.rendered.rgb_pixel(90, 60), Some([0, 255, 0]));
        assert!(output.segmentation.is_none());

        let (image, text) = output.into_parts();
        assert_eq!(image.dimensions(), (200, 100));
        assert_eq!(text, answer);
    }

    #[test]
    fn test_point_pipeline_without_points_returns_input() {
        let orchestrator = Orchestrator::pointing(
            Box::new(CannedTextGenerator::new("A black dog on a wooden floor.")),
            OverlayRenderer::default(),
        );
        let image = gray(30, 20);
        let (rendered, text) = orchestrator.run(image.clone(), "Describe this image.").unwrap().into_parts();
        assert_eq!(rendered, image);
        assert_eq!(text, "A black dog on a wooden floor.");
    }

    #[test]
    fn test_generator_failure_propagates() {
        let orchestrator = Orchestrator::pointing(Box::new(FailingGenerator), OverlayRenderer::default());
        let err = orchestrator.run(gray(10, 10), "x").unwrap_err();
        assert!(matches!(err, PipelineError::Collaborator(_)));
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn test_segment_pipeline_sends_positive_points_and_box() {
        let segmenter = RecordingSegmenter {
            result: SegmentationResult::new(vec![
                ScoredMask { mask: square_mask(100, 100, 60, 70), score: 0.1 },
                ScoredMask { mask: square_mask(100, 100, 5, 35), score: 0.8 },
            ]),
            ..Default::default()
        };
        let seen = segmenter.seen.clone();

        let orchestrator = Orchestrator::segmenting(
            Box::new(CannedTextGenerator::new(r#"<points x1="10.0" y1="20.0" x2="30.0" y2="40.0">"#)),
            Box::new(segmenter),
            OverlayRenderer::default(),
        )
        .with_box(BoxPrompt::new(0, 0, 50, 50));
        assert_eq!(orchestrator.variant(), Variant::Segment);

        let output = orchestrator.run(gray(100, 100), "Point where the dog is.").unwrap();
        assert_eq!(output.points, vec![PixelPoint::new(10, 20), PixelPoint::new(30, 40)]);

        let prompts = seen.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(
            prompts[0].points,
            vec![
                LabeledPoint::positive(PixelPoint::new(10, 20)),
                LabeledPoint::positive(PixelPoint::new(30, 40)),
            ]
        );
        assert_eq!(prompts[0].bbox, Some(BoxPrompt::new(0, 0, 50, 50)));

        // Ranked best-first
        let ranked = output.segmentation.unwrap();
        assert_eq!(ranked.best().map(|c| c.score), Some(0.8));
        // Low-score mask region is untouched
        assert_eq!(output.rendered.rgb_pixel(65, 65), Some([90, 90, 90]));
        // Best mask interior is tinted
        assert_ne!(output.rendered.rgb_pixel(25, 15), Some([90, 90, 90]));
    }

    #[test]
    fn test_segment_pipeline_requires_points() {
        let segmenter = RecordingSegmenter::default();
        let seen = segmenter.seen.clone();
        let orchestrator = Orchestrator::segmenting(
            Box::new(CannedTextGenerator::new("I cannot see a dog.")),
            Box::new(segmenter),
            OverlayRenderer::default(),
        );

        let err = orchestrator.run(gray(10, 10), "Point at the dog.").unwrap_err();
        assert!(matches!(err, PipelineError::NoPoints));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_segment_pipeline_rejects_incongruent_masks() {
        let orchestrator = Orchestrator::segmenting(
            Box::new(CannedTextGenerator::new(r#"<point x="50" y="50">"#)),
            Box::new(CannedSegmenter::new(SegmentationResult::new(vec![ScoredMask {
                mask: Mask::new(4, 4),
                score: 0.9,
            }]))),
            OverlayRenderer::default(),
        );

        let err = orchestrator.run(gray(10, 10), "x").unwrap_err();
        assert!(matches!(err, PipelineError::Collaborator(CollaboratorError::Malformed(_))));
    }

    #[test]
    fn test_concurrent_runs_share_nothing() {
        let orchestrator = Arc::new(Orchestrator::pointing(
            Box::new(CannedTextGenerator::new(r#"<point x="50" y="50">"#)),
            OverlayRenderer::default(),
        ));

        let handles: Vec<_> = (1..=4u32)
            .map(|i| {
                let orchestrator = Arc::clone(&orchestrator);
                std::thread::spawn(move || orchestrator.run(gray(20 * i, 10 * i), "x").unwrap())
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let output = handle.join().unwrap();
            let i = i as i64 + 1;
            assert_eq!(output.points, vec![PixelPoint::new(10 * i, 5 * i)]);
        }
    }
}
