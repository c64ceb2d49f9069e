//! Segmentation result parsing and baseline overlay rendering.

use crate::error::OverlayError;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use serde::Deserialize;
use std::path::Path;

const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_WIDTH: u32 = 2;

/// Contents of the segmenter's JSON side-effect file. Only `lines[].baseline` is used.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SegmentationResult {
    #[serde(default)]
    pub lines: Vec<SegmentedLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SegmentedLine {
    #[serde(default)]
    pub baseline: Option<Vec<Vec<f64>>>,
}

/// One outline edge: ((x1, y1), (x2, y2)) in image pixel coordinates.
pub type Segment = ((f64, f64), (f64, f64));

pub fn load_segmentation(path: &Path) -> Result<SegmentationResult, OverlayError> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Point list to flat coordinate list. `None` when there are fewer than two points
/// or fewer than four coordinates.
pub fn flatten_baseline(points: &[Vec<f64>]) -> Option<Vec<f64>> {
    if points.len() < 2 {
        return None;
    }
    let flat: Vec<f64> = points.iter().flatten().copied().collect();
    (flat.len() >= 4).then_some(flat)
}

/// Edges of the closed polygon through the flat coordinates; the last point joins the first.
pub fn outline_segments(flat: &[f64]) -> Vec<Segment> {
    let points: Vec<(f64, f64)> = flat.chunks_exact(2).map(|c| (c[0], c[1])).collect();
    if points.len() < 2 {
        return Vec::new();
    }
    (0..points.len())
        .map(|i| (points[i], points[(i + 1) % points.len()]))
        .collect()
}

/// Outline edges for every line with a usable baseline, in file order.
pub fn overlay_segments(result: &SegmentationResult) -> Vec<Segment> {
    result
        .lines
        .iter()
        .filter_map(|line| line.baseline.as_deref())
        .filter_map(flatten_baseline)
        .flat_map(|flat| outline_segments(&flat))
        .collect()
}

/// Number of lines that will actually be drawn.
pub fn drawable_lines(result: &SegmentationResult) -> usize {
    result
        .lines
        .iter()
        .filter_map(|line| line.baseline.as_deref())
        .filter(|b| flatten_baseline(b).is_some())
        .count()
}

/// Draw the outlines onto an RGB copy of `image`.
pub fn draw_overlay(image: &DynamicImage, segments: &[Segment]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for &((x1, y1), (x2, y2)) in segments {
        for t in 0..OUTLINE_WIDTH {
            let o = t as f32;
            let (x1, y1, x2, y2) = (x1 as f32, y1 as f32, x2 as f32, y2 as f32);
            draw_line_segment_mut(&mut canvas, (x1 + o, y1), (x2 + o, y2), OUTLINE_COLOR);
            draw_line_segment_mut(&mut canvas, (x1, y1 + o), (x2, y2 + o), OUTLINE_COLOR);
        }
    }
    canvas
}

/// Draw `result` over `image` and save the overlay to `out`. Returns the number of lines drawn.
pub fn render_overlay(
    image: &DynamicImage,
    result: &SegmentationResult,
    out: &Path,
) -> Result<usize, OverlayError> {
    let canvas = draw_overlay(image, &overlay_segments(result));
    canvas.save_with_format(out, image::ImageFormat::Png)?;
    Ok(drawable_lines(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[[f64; 2]]) -> Vec<Vec<f64>> {
        raw.iter().map(|p| p.to_vec()).collect()
    }

    #[test]
    fn short_baselines_are_skipped() {
        assert_eq!(flatten_baseline(&[]), None);
        assert_eq!(flatten_baseline(&pts(&[[1.0, 2.0]])), None);
        assert_eq!(flatten_baseline(&[vec![1.0], vec![2.0]]), None);
        assert_eq!(
            flatten_baseline(&pts(&[[0.0, 0.0], [10.0, 0.0]])),
            Some(vec![0.0, 0.0, 10.0, 0.0])
        );
    }

    #[test]
    fn outline_is_closed() {
        let segs = outline_segments(&[0.0, 0.0, 10.0, 0.0, 10.0, 10.0]);
        assert_eq!(
            segs,
            vec![
                ((0.0, 0.0), (10.0, 0.0)),
                ((10.0, 0.0), (10.0, 10.0)),
                ((10.0, 10.0), (0.0, 0.0)),
            ]
        );
    }

    #[test]
    fn parses_lines_ignoring_extra_fields() {
        let json = r#"{
            "type": "baselines",
            "lines": [
                {"baseline": [[0,0],[10,0],[10,10]], "boundary": [[0,0]], "tags": {}},
                {"boundary": [[1,1],[2,2]]},
                {"baseline": null},
                {"baseline": [[5,5]]}
            ]
        }"#;
        let result: SegmentationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.lines.len(), 4);
        assert_eq!(drawable_lines(&result), 1);
        assert_eq!(overlay_segments(&result).len(), 3);
    }

    #[test]
    fn missing_lines_is_empty() {
        let result: SegmentationResult = serde_json::from_str("{}").unwrap();
        assert!(result.lines.is_empty());
        assert!(overlay_segments(&result).is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_segmentation(&path),
            Err(OverlayError::Json(_))
        ));
        assert!(matches!(
            load_segmentation(&dir.path().join("absent.json")),
            Err(OverlayError::Read(_))
        ));
    }

    #[test]
    fn rendering_is_deterministic() {
        let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([255, 255, 255])));
        let result: SegmentationResult =
            serde_json::from_str(r#"{"lines":[{"baseline":[[0,0],[10,0],[10,10]]}]}"#).unwrap();
        let segs = overlay_segments(&result);

        let a = draw_overlay(&base, &segs);
        let b = draw_overlay(&base, &segs);
        assert_eq!(a.as_raw(), b.as_raw());
        assert_eq!(*a.get_pixel(5, 0), OUTLINE_COLOR);
        assert_eq!(*a.get_pixel(10, 5), OUTLINE_COLOR);
        assert_eq!(*a.get_pixel(2, 15), Rgb([255, 255, 255]));
    }

    #[test]
    fn overlay_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("overlay.png");
        let base = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let result: SegmentationResult =
            serde_json::from_str(r#"{"lines":[{"baseline":[[1,1],[8,8]]}]}"#).unwrap();

        let drawn = render_overlay(&base, &result, &out).unwrap();
        assert_eq!(drawn, 1);
        let reloaded = image::open(&out).unwrap();
        assert_eq!(reloaded.width(), 16);
    }
}
