/// Coordinate extraction from free-text model answers
///
/// Pointing models tag their answers with XML-ish attributes:
///   single:   `<point x="45.3" y="60.1" alt="dog">dog</point>`
///   multiple: `<points x1="10.0" y1="20.0" x2="30.0" y2="40.0" alt="..">..</points>`
/// Anything that does not match simply yields no points.
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use super::RawPoint;

/// Substring that switches the parser to indexed attribute pairs
const MULTI_POINT_MARKER: &str = "points";

static MULTI_POINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"x\d+="([\d.]+)" y\d+="([\d.]+)""#)
        .expect("multi-point pattern is valid")
});

static SINGLE_POINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"x="([\d.]+)" y="([\d.]+)""#)
        .expect("single-point pattern is valid")
});

/// Extract every point in `text`, in order of appearance.
///
/// Indexed pairs (`x1=".." y1=".."`) are truncated to whole percentages; a
/// lone `x=".." y=".."` pair keeps its fractional part. Values may start or
/// end with a dot (`5.`, `.5`); runs like `1.2.3` are not numbers and their
/// pair is skipped. Returns an empty vector when nothing matches.
pub fn parse(text: &str) -> Vec<RawPoint> {
    let points = if text.contains(MULTI_POINT_MARKER) {
        parse_multi(text)
    } else {
        parse_single(text).into_iter().collect()
    };

    debug!("Extracted {} point(s) from {} chars of model output", points.len(), text.len());
    points
}

fn parse_multi(text: &str) -> Vec<RawPoint> {
    MULTI_POINT_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let x = caps[1].parse::<f64>().ok()?;
            let y = caps[2].parse::<f64>().ok()?;
            Some(RawPoint::new(x.trunc(), y.trunc()))
        })
        .collect()
}

fn parse_single(text: &str) -> Option<RawPoint> {
    let caps = SINGLE_POINT_RE.captures(text)?;
    let x = caps[1].parse::<f64>().ok()?;
    let y = caps[2].parse::<f64>().ok()?;
    Some(RawPoint::new(x, y))
}
