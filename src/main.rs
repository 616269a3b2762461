mod build_info;
mod collab;
mod config;
mod coords;
mod frame;
mod logging;
mod overlay;
mod pipeline;
mod segmentation;
mod settings;
mod utils;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use serde::Serialize;

use crate::build_info::BuildInfo;
use crate::collab::canned::{CannedSegmenter, CannedTextGenerator};
use crate::collab::command::{CommandSegmenter, CommandTextGenerator};
use crate::collab::placeholder::fetch_placeholder;
use crate::collab::{Segmenter, TextGenerator};
use crate::coords::{PixelPoint, RawPoint};
use crate::frame::ImageFrame;
use crate::overlay::OverlayRenderer;
use crate::pipeline::{Orchestrator, PipelineOutput, Variant};
use crate::segmentation::rle_decoder::{encode_rle, RleMask};
use crate::segmentation::BoxPrompt;
use crate::settings::UserSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Draw the points the model answered with
    Point,
    /// Segment the object under the points and draw the best mask
    Segment,
}

#[derive(Debug, Parser)]
#[command(name = "pointseg")]
#[command(about = "Ask a vision-language model to point at things, then draw or segment what it pointed at")]
#[command(version, long_version = BuildInfo::build_string())]
struct Args {
    /// Input image. A placeholder image is downloaded when omitted.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Prompt sent to the model together with the image
    #[arg(long, default_value = config::DEFAULT_PROMPT)]
    prompt: String,

    #[arg(long, value_enum, default_value_t = Mode::Point)]
    mode: Mode,

    /// Where to write the rendered result. A `.raw` extension writes the
    /// packed pixels in the configured output channel order instead of PNG.
    #[arg(long, default_value = config::DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Replay a recorded model answer instead of running the generator program
    #[arg(long)]
    response_file: Option<PathBuf>,

    /// Replay a recorded segmenter answer (JSON) instead of running the segmenter program
    #[arg(long)]
    masks_file: Option<PathBuf>,

    /// Box prompt for segmentation, in pixels
    #[arg(long = "box", value_name = "x0,y0,x1,y1", value_parser = parse_box)]
    bbox: Option<BoxPrompt>,

    /// Write a JSON summary of the run
    #[arg(long)]
    report: Option<PathBuf>,

    /// Settings file to use instead of the default location
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the settings file (with comments) and exit
    #[arg(long)]
    init_settings: bool,
}

fn parse_box(s: &str) -> Result<BoxPrompt, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("box coordinates must be integers: {e}"))?;

    match values.as_slice() {
        [x0, y0, x1, y1] => Ok(BoxPrompt::new(*x0, *y0, *x1, *y1)),
        _ => Err(format!("expected 4 comma-separated values, got {}", values.len())),
    }
}

#[derive(Debug, Serialize)]
struct StageTiming {
    stage: String,
    ms: f64,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    version: &'static str,
    mode: Variant,
    prompt: &'a str,
    model_output: &'a str,
    raw_points: &'a [RawPoint],
    points: &'a [PixelPoint],
    timings: Vec<StageTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_mask: Option<RleMask>,
}

impl<'a> Report<'a> {
    fn new(mode: Variant, prompt: &'a str, output: &'a PipelineOutput) -> Self {
        let segmentation = output.segmentation.as_ref();
        Self {
            version: BuildInfo::version(),
            mode,
            prompt,
            model_output: &output.model_output,
            raw_points: &output.raw_points,
            points: &output.points,
            timings: output
                .timings
                .iter()
                .map(|t| StageTiming {
                    stage: t.name.clone(),
                    ms: t.average_ms(),
                })
                .collect(),
            scores: segmentation.map(|r| r.candidates.iter().map(|c| c.score).collect()),
            best_mask: segmentation.and_then(|r| r.best()).map(|best| encode_rle(&best.mask)),
        }
    }
}

fn load_image(args: &Args, settings: &UserSettings) -> Result<ImageFrame> {
    match &args.image {
        Some(path) => {
            let frame = ImageFrame::open(path).with_context(|| format!("failed to open image {}", path.display()))?;
            info!("Loaded {} ({}x{})", path.display(), frame.width(), frame.height());
            Ok(frame)
        }
        None => fetch_placeholder(&settings.placeholder_url).context("failed to fetch placeholder image"),
    }
}

fn build_generator(args: &Args, settings: &UserSettings, settings_path: &Path) -> Result<Box<dyn TextGenerator>> {
    if let Some(path) = &args.response_file {
        return Ok(Box::new(CannedTextGenerator::from_file(path).with_context(|| {
            format!("failed to read model answer from {}", path.display())
        })?));
    }
    let generator = CommandTextGenerator::new(settings.generator.clone()).with_context(|| {
        format!(
            "set generator.program in {} (see --init-settings) or pass --response-file",
            settings_path.display()
        )
    })?;
    Ok(Box::new(generator))
}

fn build_segmenter(args: &Args, settings: &UserSettings, settings_path: &Path) -> Result<Box<dyn Segmenter>> {
    if let Some(path) = &args.masks_file {
        return Ok(Box::new(CannedSegmenter::from_file(path).with_context(|| {
            format!("failed to read segmenter answer from {}", path.display())
        })?));
    }
    let segmenter = CommandSegmenter::new(settings.segmenter.clone()).with_context(|| {
        format!(
            "set segmenter.program in {} (see --init-settings) or pass --masks-file",
            settings_path.display()
        )
    })?;
    Ok(Box::new(segmenter))
}

fn save_output(frame: ImageFrame, path: &Path) -> Result<()> {
    let is_raw = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("raw"));

    let written = if is_raw {
        debug!("Writing raw {:?} pixels", frame.order());
        fs::write(path, frame.as_raw())
    } else {
        frame
            .into_rgb_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(std::io::Error::other)
    };
    written.with_context(|| format!("failed to write {}", path.display()))?;

    info!("Saved result to {}", path.display());
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let settings_path = args.settings.clone().unwrap_or_else(UserSettings::settings_path);
    let settings = UserSettings::load(args.settings.as_deref().and_then(Path::to_str));

    if args.init_settings {
        settings
            .save(&settings_path)
            .with_context(|| format!("failed to write {}", settings_path.display()))?;
        println!("Settings written to {}", settings_path.display());
        return Ok(());
    }

    if args.prompt.trim().is_empty() {
        bail!("prompt must not be empty");
    }

    let renderer = OverlayRenderer::new(settings.style.clone()).with_output_order(settings.output_order.into());
    let generator = build_generator(&args, &settings, &settings_path)?;

    let orchestrator = match args.mode {
        Mode::Point => {
            if args.bbox.is_some() {
                warn!("--box is only used in segment mode, ignoring it");
            }
            Orchestrator::pointing(generator, renderer)
        }
        Mode::Segment => {
            let segmenter = build_segmenter(&args, &settings, &settings_path)?;
            let orchestrator = Orchestrator::segmenting(generator, segmenter, renderer);
            match args.bbox {
                Some(bbox) => orchestrator.with_box(bbox),
                None => orchestrator,
            }
        }
    }
    .with_generation(settings.generation.clone());

    let image = load_image(&args, &settings)?;
    let output = orchestrator.run(image, &args.prompt)?;

    if let Some(path) = &args.report {
        let report = Report::new(orchestrator.variant(), &args.prompt, &output);
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("failed to write report {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    let (rendered, model_output) = output.into_parts();
    save_output(rendered, &args.output)?;
    println!("{model_output}");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_buffer = logging::setup_logger();
    logging::setup_panic_hook(log_buffer);
    info!("pointseg {}", BuildInfo::display_version());
    debug!("{}", BuildInfo::detailed_info());

    run(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_box() {
        assert_eq!(parse_box("1,2,30,40"), Ok(BoxPrompt::new(1, 2, 30, 40)));
        assert_eq!(parse_box(" 5, 6 ,7,8 "), Ok(BoxPrompt::new(5, 6, 7, 8)));
        assert!(parse_box("1,2,3").is_err());
        assert!(parse_box("1,2,3,x").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["pointseg"]).unwrap();
        assert_eq!(args.mode, Mode::Point);
        assert_eq!(args.prompt, config::DEFAULT_PROMPT);
        assert_eq!(args.output, PathBuf::from(config::DEFAULT_OUTPUT_FILE));
        assert!(args.image.is_none() && args.bbox.is_none());

        let args = Args::try_parse_from(["pointseg", "--mode", "segment", "--box", "0,0,10,10"]).unwrap();
        assert_eq!(args.mode, Mode::Segment);
        assert_eq!(args.bbox, Some(BoxPrompt::new(0, 0, 10, 10)));

        assert!(Args::try_parse_from(["pointseg", "--mode", "track"]).is_err());
    }

    #[test]
    fn test_report_contents() {
        let orchestrator = Orchestrator::pointing(
            Box::new(CannedTextGenerator::new(r#"<point x="50" y="25">x</point>"#)),
            OverlayRenderer::default(),
        );
        let frame = ImageFrame::filled(8, 8, [0, 0, 0]).unwrap();
        let output = orchestrator.run(frame, "Point at x.").unwrap();

        let report = Report::new(orchestrator.variant(), "Point at x.", &output);
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "point");
        assert_eq!(json["points"], serde_json::json!([{"x": 4, "y": 2}]));
        assert_eq!(json["raw_points"], serde_json::json!([{"x": 50.0, "y": 25.0}]));
        assert_eq!(json["timings"].as_array().map(Vec::len), Some(2));
        assert!(json.get("best_mask").is_none());
    }

    #[test]
    fn test_save_output_raw_keeps_channel_order() {
        let dir = tempfile::tempdir().unwrap();
        let frame = ImageFrame::filled(2, 1, [1, 2, 3]).unwrap().into_order(crate::frame::ChannelOrder::Bgr);

        let raw = dir.path().join("out.raw");
        save_output(frame.clone(), &raw).unwrap();
        assert_eq!(fs::read(&raw).unwrap(), vec![3, 2, 1, 3, 2, 1]);

        let png = dir.path().join("out.png");
        save_output(frame, &png).unwrap();
        let decoded = ImageFrame::open(&png).unwrap();
        assert_eq!(decoded.rgb_pixel(1, 0), Some([1, 2, 3]));
    }
}
