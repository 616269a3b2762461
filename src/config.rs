// Default values for configuration
// These serve as fallback values for settings.yaml and for "reset to defaults"

pub const APP_NAME: &str = "pointseg";

// Generation bounds passed to the text-generation program
pub const DEFAULT_MAX_NEW_TOKENS: usize = 200;
pub const DEFAULT_STOP_STRING: &str = "<|endoftext|>";
pub const DEFAULT_PROMPT: &str = "Describe this image.";

// Used when no image is supplied
pub const DEFAULT_PLACEHOLDER_URL: &str = "https://picsum.photos/id/237/536/354";

pub const DEFAULT_OUTPUT_FILE: &str = "result.png";

// Point mode
pub const DEFAULT_POINT_RADIUS: f32 = 5.0;
pub const DEFAULT_POINT_COLOR: [u8; 3] = [0, 255, 0];

// Segmentation mode
pub const DEFAULT_MASK_COLOR: [u8; 3] = [255, 40, 50];
pub const DEFAULT_MASK_ALPHA: f32 = 0.6;
pub const DEFAULT_CONTOUR_COLOR: [u8; 3] = [255, 0, 0];
pub const DEFAULT_CONTOUR_WIDTH: f32 = 2.0;
pub const DEFAULT_CONTOUR_EPSILON_RATIO: f32 = 0.01; // fraction of contour perimeter
pub const DEFAULT_MARKER_RADIUS: f32 = 6.0;
pub const DEFAULT_MARKER_EDGE_WIDTH: f32 = 1.25;
pub const DEFAULT_POSITIVE_COLOR: [u8; 3] = [0, 128, 0];
pub const DEFAULT_NEGATIVE_COLOR: [u8; 3] = [255, 0, 0];
pub const DEFAULT_BOX_WIDTH: f32 = 2.0;
