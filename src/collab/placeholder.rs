use log::info;

use super::CollaboratorError;
use crate::frame::ImageFrame;

/// Download and decode the stand-in image used when no image is supplied
pub fn fetch_placeholder(url: &str) -> Result<ImageFrame, CollaboratorError> {
    info!("No image supplied, fetching placeholder from {}", url);

    let bytes = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;
    let frame = ImageFrame::from_memory(&bytes)?;

    info!("Placeholder image is {}x{}", frame.width(), frame.height());
    Ok(frame)
}
