/// Collaborators backed by external inference programs
///
/// Model runtimes live outside this binary. Each call writes the image to a
/// temporary PNG, runs the configured program with templated arguments and
/// reads its stdout:
///   text generation: `{image}`, `{prompt}`, `{max_new_tokens}`, `{stop}` -> raw answer text
///   segmentation:    `{image}`, `{points}`, `{box}` -> [`SegmenterResponse`] JSON
use std::process::Command;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{CollaboratorError, GenerationConfig, Segmenter, SegmenterResponse, TextGenerator};
use crate::frame::ImageFrame;
use crate::segmentation::{SegmentPrompt, SegmentationResult};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

/// Program plus argument template, as stored in settings.yaml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    #[cfg(test)]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.program.trim().is_empty()
    }

    /// Substitute `{name}` placeholders in one pass; unknown names stay as written.
    fn expand_args(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                PLACEHOLDER_RE
                    .replace_all(arg, |caps: &Captures| {
                        vars.iter()
                            .find(|(name, _)| *name == &caps[1])
                            .map(|(_, value)| value.to_string())
                            .unwrap_or_else(|| caps[0].to_string())
                    })
                    .into_owned()
            })
            .collect()
    }

    /// Run to completion and return stdout; non-zero exit is an error.
    fn run(&self, vars: &[(&str, &str)]) -> Result<Vec<u8>, CollaboratorError> {
        let args = self.expand_args(vars);
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| CollaboratorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CollaboratorError::Exited {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Write `image` to a PNG that lives as long as the returned handle
fn write_temp_png(image: &ImageFrame) -> Result<NamedTempFile, CollaboratorError> {
    let file = tempfile::Builder::new()
        .prefix("pointseg-")
        .suffix(".png")
        .tempfile()?;
    image
        .clone()
        .into_rgb_image()
        .save_with_format(file.path(), image::ImageFormat::Png)?;
    Ok(file)
}

pub struct CommandTextGenerator {
    spec: CommandSpec,
}

impl CommandTextGenerator {
    pub fn new(spec: CommandSpec) -> Result<Self, CollaboratorError> {
        if !spec.is_configured() {
            return Err(CollaboratorError::NotConfigured("text generation"));
        }
        Ok(Self { spec })
    }
}

impl TextGenerator for CommandTextGenerator {
    fn generate(&self, image: &ImageFrame, prompt: &str, config: &GenerationConfig) -> Result<String, CollaboratorError> {
        let file = write_temp_png(image)?;
        let image_path = file.path().to_string_lossy().into_owned();
        let max_new_tokens = config.max_new_tokens.to_string();

        let stdout = self.spec.run(&[
            ("image", &image_path),
            ("prompt", prompt),
            ("max_new_tokens", &max_new_tokens),
            ("stop", &config.stop_string),
        ])?;

        let text = String::from_utf8_lossy(&stdout);
        info!("{} returned {} bytes", self.spec.program, stdout.len());
        Ok(config.apply_stop(&text))
    }
}

pub struct CommandSegmenter {
    spec: CommandSpec,
}

impl CommandSegmenter {
    pub fn new(spec: CommandSpec) -> Result<Self, CollaboratorError> {
        if !spec.is_configured() {
            return Err(CollaboratorError::NotConfigured("segmentation"));
        }
        Ok(Self { spec })
    }
}

/// `[[x, y, label], ...]` with label 1 for positive and 0 for negative
fn points_json(prompt: &SegmentPrompt) -> String {
    let triples: Vec<[i64; 3]> = prompt
        .points
        .iter()
        .map(|p| [p.point.x, p.point.y, i64::from(p.label.as_int())])
        .collect();
    serde_json::to_string(&triples).unwrap_or_else(|_| "[]".to_string())
}

fn box_json(prompt: &SegmentPrompt) -> String {
    match prompt.bbox {
        Some(b) => format!("[{},{},{},{}]", b.x0, b.y0, b.x1, b.y1),
        None => "null".to_string(),
    }
}

impl Segmenter for CommandSegmenter {
    fn segment(&self, image: &ImageFrame, prompt: &SegmentPrompt) -> Result<SegmentationResult, CollaboratorError> {
        let file = write_temp_png(image)?;
        let image_path = file.path().to_string_lossy().into_owned();
        let points = points_json(prompt);
        let bbox = box_json(prompt);

        let stdout = self.spec.run(&[("image", &image_path), ("points", &points), ("box", &bbox)])?;
        let result = SegmenterResponse::from_json(&stdout)?.to_result(image.width(), image.height())?;
        info!("{} returned {} mask(s)", self.spec.program, result.len());
        Ok(result)
    }
}
