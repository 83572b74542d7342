//! Landmark annotation: draws the detected face box, its five landmarks and a
//! confidence label under the box.

use crate::capability::{CapabilityError, LandmarkAnnotator};
use crate::detector::FaceDetector;
use crate::types::{BoundingBox, LEFT_EYE, LEFT_MOUTH, NOSE, RIGHT_EYE, RIGHT_MOUTH};
use ab_glyph::{Font, FontRef, InvalidFont, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const EYE_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const NOSE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MOUTH_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 255, 150]);

const BOX_THICKNESS: i64 = 7;
const MARKER_RADIUS: i64 = 20;
const MARKER_THICKNESS: i64 = 5;

/// Label origin relative to the box's bottom-left corner.
const LABEL_OFFSET: (i32, i32) = (-20, 28);
const LABEL_SCALE: f32 = 30.0;

static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// The bundled DejaVu Sans face used for labels.
pub fn label_font() -> Result<FontRef<'static>, InvalidFont> {
    FontRef::try_from_slice(LABEL_FONT)
}

/// [`LandmarkAnnotator`] backed by the SCRFD detector.
pub struct LandmarkPainter {
    detector: FaceDetector,
    font: FontRef<'static>,
}

impl LandmarkPainter {
    pub fn new(detector: FaceDetector) -> Result<Self, CapabilityError> {
        Ok(Self { detector, font: label_font()? })
    }

    pub fn load(scrfd_path: &Path) -> Result<Self, CapabilityError> {
        Self::new(FaceDetector::load(scrfd_path)?)
    }
}

impl LandmarkAnnotator for LandmarkPainter {
    fn annotate(&mut self, image: &DynamicImage) -> Result<Option<DynamicImage>, CapabilityError> {
        let mut canvas = image.to_rgb8();
        let faces = self.detector.detect(&canvas)?;

        // Only the most confident face is marked.
        let Some(face) = faces.first() else {
            return Ok(None);
        };
        tracing::debug!(confidence = face.confidence, faces = faces.len(), "annotating face");

        paint_face(&mut canvas, face, &self.font);
        Ok(Some(DynamicImage::ImageRgb8(canvas)))
    }
}

/// Text drawn under the box, e.g. `0.9987 % Find Coor`.
pub fn score_label(confidence: f32) -> String {
    let rounded = (confidence * 10_000.0).round() / 10_000.0;
    format!("{rounded} % Find Coor")
}

/// Draw the bounding box, landmark markers and score label of `face` onto `canvas`.
pub fn paint_face(canvas: &mut RgbImage, face: &BoundingBox, font: &impl Font) {
    let x1 = face.x.round() as i64;
    let y1 = face.y.round() as i64;
    let x2 = (face.x + face.width).round() as i64;
    let y2 = (face.y + face.height).round() as i64;
    draw_rect_outline(canvas, (x1, y1), (x2, y2), BOX_THICKNESS, BOX_COLOR);

    if let Some(landmarks) = face.landmarks {
        let markers = [
            (RIGHT_EYE, EYE_COLOR),
            (LEFT_EYE, EYE_COLOR),
            (NOSE, NOSE_COLOR),
            (RIGHT_MOUTH, MOUTH_COLOR),
            (LEFT_MOUTH, MOUTH_COLOR),
        ];
        for (point, color) in markers {
            let (x, y) = landmarks[point];
            draw_ring(canvas, (x as i64, y as i64), MARKER_RADIUS, MARKER_THICKNESS, color);
        }
    }

    draw_text_mut(
        canvas,
        LABEL_COLOR,
        x1 as i32 + LABEL_OFFSET.0,
        y2 as i32 + LABEL_OFFSET.1,
        PxScale::from(LABEL_SCALE),
        font,
        &score_label(face.confidence),
    );
}

fn put(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

/// Rectangle outline whose stroke is centred on the given corners.
fn draw_rect_outline(canvas: &mut RgbImage, (x1, y1): (i64, i64), (x2, y2): (i64, i64), thickness: i64, color: Rgb<u8>) {
    let half = thickness / 2;
    let (outer_x1, outer_y1, outer_x2, outer_y2) = (x1 - half, y1 - half, x2 + half, y2 + half);
    let (inner_x1, inner_y1, inner_x2, inner_y2) = (x1 + half, y1 + half, x2 - half, y2 - half);

    for y in outer_y1..=outer_y2 {
        for x in outer_x1..=outer_x2 {
            let inside = x > inner_x1 && x < inner_x2 && y > inner_y1 && y < inner_y2;
            if !inside {
                put(canvas, x, y, color);
            }
        }
    }
}

/// Circle outline of `radius` with a stroke of `thickness` centred on it.
fn draw_ring(canvas: &mut RgbImage, (cx, cy): (i64, i64), radius: i64, thickness: i64, color: Rgb<u8>) {
    let half = thickness as f32 / 2.0;
    let (inner, outer) = (radius as f32 - half, radius as f32 + half);
    let reach = outer.ceil() as i64;

    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let d = ((dx * dx + dy * dy) as f32).sqrt();
            if d >= inner && d <= outer {
                put(canvas, cx + dx, cy + dy, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> BoundingBox {
        BoundingBox {
            x: 40.0,
            y: 40.0,
            width: 120.0,
            height: 120.0,
            confidence: 0.99,
            landmarks: Some([(70.0, 80.0), (130.0, 80.0), (100.0, 110.0), (75.0, 135.0), (125.0, 135.0)]),
        }
    }

    #[test]
    fn test_paint_face_draws_box_and_markers() {
        let mut canvas = RgbImage::new(200, 200);
        paint_face(&mut canvas, &face(), &label_font().unwrap());

        // Box edge
        assert_eq!(canvas.get_pixel(100, 40), &BOX_COLOR);
        assert_eq!(canvas.get_pixel(40, 100), &BOX_COLOR);
        // Ring around the left eye, on its radius
        assert_eq!(canvas.get_pixel(70 + 20, 80), &EYE_COLOR);
        // Nose ring
        assert_eq!(canvas.get_pixel(100, 110 - 20), &NOSE_COLOR);
        // Mouth ring
        assert_eq!(canvas.get_pixel(75, 135 + 20), &MOUTH_COLOR);
        // Centre of a marker and of the box stay untouched
        assert_eq!(canvas.get_pixel(100, 110), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_paint_face_without_landmarks_draws_no_markers() {
        let mut canvas = RgbImage::new(200, 200);
        let mut f = face();
        f.landmarks = None;
        paint_face(&mut canvas, &f, &label_font().unwrap());
        assert_eq!(canvas.get_pixel(160, 100), &BOX_COLOR);
        assert!(canvas
            .pixels()
            .all(|p| *p != EYE_COLOR && *p != NOSE_COLOR && *p != MOUTH_COLOR));
    }

    #[test]
    fn test_score_label_rounds_to_four_places() {
        assert_eq!(score_label(0.998_712), "0.9987 % Find Coor");
        assert_eq!(score_label(0.5), "0.5 % Find Coor");
    }

    #[test]
    fn test_paint_face_writes_label_below_box() {
        let mut canvas = RgbImage::new(300, 300);
        paint_face(&mut canvas, &face(), &label_font().unwrap());

        // Box bottom stroke ends at y = 163; the label sits further down.
        let below_box = (170..240u32)
            .flat_map(|y| (20..300u32).map(move |x| (x, y)))
            .filter(|&(x, y)| canvas.get_pixel(x, y) != &Rgb([0, 0, 0]))
            .count();
        assert!(below_box > 50, "only {below_box} label pixels");

        // Nothing is drawn above the box.
        assert!((0..30u32).all(|y| (0..300u32).all(|x| canvas.get_pixel(x, y) == &Rgb([0, 0, 0]))));
    }

    #[test]
    fn test_drawing_clips_at_image_edges() {
        let mut canvas = RgbImage::new(10, 10);
        draw_ring(&mut canvas, (0, 0), 20, 5, NOSE_COLOR);
        draw_rect_outline(&mut canvas, (-5, -5), (50, 50), 7, BOX_COLOR);
        paint_face(&mut canvas, &face(), &label_font().unwrap());
        assert_eq!(canvas.dimensions(), (10, 10));
    }
}
