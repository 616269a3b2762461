use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collab::command::CommandSpec;
use crate::collab::GenerationConfig;
use crate::config;
use crate::frame::ChannelOrder;
use crate::overlay::RenderStyle;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Channel order of the saved result image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputOrder {
    #[default]
    Rgb,
    Bgr,
}

impl From<OutputOrder> for ChannelOrder {
    fn from(order: OutputOrder) -> Self {
        match order {
            OutputOrder::Rgb => ChannelOrder::Rgb,
            OutputOrder::Bgr => ChannelOrder::Bgr,
        }
    }
}

/// User settings that persist across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Program that answers a prompt about an image
    #[serde(default)]
    pub generator: CommandSpec,

    /// Program that turns point prompts into masks
    #[serde(default)]
    pub segmenter: CommandSpec,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub style: RenderStyle,

    /// Image fetched when no --image is given
    #[serde(default = "default_placeholder_url")]
    pub placeholder_url: String,

    #[serde(default)]
    pub output_order: OutputOrder,
}

fn default_placeholder_url() -> String {
    config::DEFAULT_PLACEHOLDER_URL.to_string()
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            generator: CommandSpec::default(),
            segmenter: CommandSpec::default(),
            generation: GenerationConfig::default(),
            style: RenderStyle::default(),
            placeholder_url: default_placeholder_url(),
            output_order: OutputOrder::default(),
        }
    }
}

impl UserSettings {
    /// Get the path to the settings file
    /// On macOS: ~/Library/Application Support/pointseg/settings.yaml
    /// On Linux: ~/.config/pointseg/settings.yaml
    /// On Windows: C:\Users\<user>\AppData\Roaming\pointseg\settings.yaml
    pub fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join(config::APP_NAME).join("settings.yaml")
    }

    /// Load settings from the YAML file.
    /// A missing or unreadable file falls back to defaults.
    pub fn load(custom_path: Option<&str>) -> Self {
        let path = match custom_path {
            Some(p) => {
                info!("Using custom settings path: {}", p);
                PathBuf::from(p)
            }
            None => Self::settings_path(),
        };

        if !path.exists() {
            info!("Settings file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str::<UserSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    debug!(
                        "Settings: generator={:?}, segmenter={:?}, max_new_tokens={}",
                        settings.generator.program, settings.segmenter.program, settings.generation.max_new_tokens
                    );
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings file at {:?}: {}", path, e);
                    warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file at {:?}: {}", path, e);
                warn!("Using default settings");
                Self::default()
            }
        }
    }

    /// Save settings to `path`.
    ///
    /// An existing file has its scalar values updated in place so hand-written
    /// comments survive; a new file gets the commented template.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        if path.exists() {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    let updated = self.update_yaml_values(&contents)?;
                    fs::write(path, updated).map_err(io_err)?;
                    info!("Saved settings to {:?} (comments preserved)", path);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed to read existing settings file for comment preservation: {}", e);
                }
            }
        }

        let yaml = self.to_yaml_with_comments()?;
        fs::write(path, yaml).map_err(io_err)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Update scalar values while preserving existing comments and structure
    fn update_yaml_values(&self, yaml_content: &str) -> Result<String, SettingsError> {
        let g = &self.generation;
        let s = &self.style;
        let scalars = [
            ("max_new_tokens", g.max_new_tokens.to_string()),
            ("stop_string", yaml_scalar(&g.stop_string)?),
            ("placeholder_url", yaml_scalar(&self.placeholder_url)?),
            ("output_order", yaml_scalar(&self.output_order)?),
            ("point_radius", s.point_radius.to_string()),
            ("mask_alpha", s.mask_alpha.to_string()),
            ("contour_width", s.contour_width.to_string()),
            ("contour_epsilon_ratio", s.contour_epsilon_ratio.to_string()),
            ("marker_radius", s.marker_radius.to_string()),
            ("marker_edge_width", s.marker_edge_width.to_string()),
            ("box_width", s.box_width.to_string()),
        ];

        let mut result = yaml_content.to_string();
        for (key, value) in &scalars {
            result = Self::replace_yaml_value(&result, key, value);
        }
        Ok(result)
    }

    /// Replace a YAML key's value while preserving the rest of the line
    fn replace_yaml_value(yaml: &str, key: &str, new_value: &str) -> String {
        let pattern = format!(r"(?m)^(\s*{}\s*:\s*)[^#\n]*?(\s*#.*)?$", regex::escape(key));

        match regex::Regex::new(&pattern) {
            Ok(re) => re
                .replace_all(yaml, |caps: &regex::Captures| {
                    let comment = caps.get(2).map_or("", |m| m.as_str());
                    format!("{}{}{}", &caps[1], new_value, comment)
                })
                .into_owned(),
            Err(e) => {
                warn!("Failed to create regex for key '{}': {}", key, e);
                yaml.to_string()
            }
        }
    }

    /// Generate YAML content with comments for new files
    fn to_yaml_with_comments(&self) -> Result<String, SettingsError> {
        let g = &self.generation;
        let s = &self.style;
        Ok(format!(
            r#"# pointseg user settings
# Loaded on every run; values here override the built-in defaults.

# Text generation program. Placeholders in args:
#   {{image}} path of a PNG of the input image
#   {{prompt}} the prompt text
#   {{max_new_tokens}}, {{stop}} generation bounds below
# The program prints the model answer to stdout.
generator:
{generator}

# Segmentation program. Placeholders in args:
#   {{image}} path of a PNG of the input image
#   {{points}} JSON [[x, y, label], ...], label 1 = positive
#   {{box}} JSON [x0, y0, x1, y1] or null
# The program prints {{"masks": [{{"size": [h, w], "counts": [...]}}], "scores": [...]}}
# with column-major run-length encoded masks.
segmenter:
{segmenter}

generation:
  # Upper bound on generated tokens
  max_new_tokens: {max_new_tokens}
  # Answer text is cut at this marker
  stop_string: {stop_string}

style:
  # Point mode
  point_radius: {point_radius}
  point_color: {point_color:?}
  # Segmentation mode
  mask_color: {mask_color:?}
  mask_alpha: {mask_alpha}
  contour_color: {contour_color:?}
  contour_width: {contour_width}
  # Outline simplification tolerance as a fraction of the outline length
  contour_epsilon_ratio: {contour_epsilon_ratio}
  marker_radius: {marker_radius}
  positive_color: {positive_color:?}
  negative_color: {negative_color:?}
  marker_edge_color: {marker_edge_color:?}
  marker_edge_width: {marker_edge_width}
  box_color: {box_color:?}
  box_width: {box_width}

# Image fetched when no --image is given
placeholder_url: {placeholder_url}

# Channel order of the saved result: rgb or bgr
output_order: {output_order}
"#,
            generator = indented_yaml(&self.generator)?,
            segmenter = indented_yaml(&self.segmenter)?,
            max_new_tokens = g.max_new_tokens,
            stop_string = yaml_scalar(&g.stop_string)?,
            point_radius = s.point_radius,
            point_color = s.point_color,
            mask_color = s.mask_color,
            mask_alpha = s.mask_alpha,
            contour_color = s.contour_color,
            contour_width = s.contour_width,
            contour_epsilon_ratio = s.contour_epsilon_ratio,
            marker_radius = s.marker_radius,
            positive_color = s.positive_color,
            negative_color = s.negative_color,
            marker_edge_color = s.marker_edge_color,
            marker_edge_width = s.marker_edge_width,
            box_color = s.box_color,
            box_width = s.box_width,
            placeholder_url = yaml_scalar(&self.placeholder_url)?,
            output_order = yaml_scalar(&self.output_order)?,
        ))
    }
}

/// A value rendered as a single-line YAML scalar, quoted when needed
fn yaml_scalar<T: Serialize>(value: &T) -> Result<String, SettingsError> {
    Ok(serde_yaml::to_string(value)?.trim_end().to_string())
}

fn indented_yaml<T: Serialize>(value: &T) -> Result<String, SettingsError> {
    let yaml = serde_yaml::to_string(value)?;
    Ok(yaml
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserSettings {
        UserSettings {
            generator: CommandSpec::new("molmo-generate", &["--image", "{image}", "--prompt", "{prompt}"]),
            segmenter: CommandSpec::new("sam-segment", &["{image}", "{points}", "{box}"]),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: UserSettings = serde_yaml::from_str("generation:\n  max_new_tokens: 64\n").unwrap();
        assert_eq!(settings.generation.max_new_tokens, 64);
        assert_eq!(settings.generation.stop_string, config::DEFAULT_STOP_STRING);
        assert_eq!(settings.style, RenderStyle::default());
        assert_eq!(settings.placeholder_url, config::DEFAULT_PLACEHOLDER_URL);
        assert!(!settings.generator.is_configured());
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        assert_eq!(UserSettings::load(Some("/nonexistent/pointseg/settings.yaml")), UserSettings::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "generation: [not, a, map").unwrap();
        assert_eq!(UserSettings::load(path.to_str()), UserSettings::default());
    }

    #[test]
    fn test_new_file_template_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.yaml");
        let settings = sample();

        settings.save(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# pointseg user settings"));
        assert_eq!(UserSettings::load(path.to_str()), settings);
    }

    #[test]
    fn test_save_preserves_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(
            &path,
            "# my notes\ngeneration:\n  max_new_tokens: 200 # keep short\noutput_order: rgb\n",
        )
        .unwrap();

        let mut settings = UserSettings::load(path.to_str());
        settings.generation.max_new_tokens = 32;
        settings.output_order = OutputOrder::Bgr;
        settings.save(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "# my notes\ngeneration:\n  max_new_tokens: 32 # keep short\noutput_order: bgr\n"
        );
        assert_eq!(UserSettings::load(path.to_str()).output_order, OutputOrder::Bgr);
    }

    #[test]
    fn test_output_order_maps_to_channel_order() {
        assert_eq!(ChannelOrder::from(OutputOrder::Bgr), ChannelOrder::Bgr);
        assert_eq!(ChannelOrder::from(OutputOrder::default()), ChannelOrder::Rgb);
    }
}
