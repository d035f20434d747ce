//! Overlay rendering: box outlines and 5x7 bitmap labels drawn straight into
//! the frame's RGB buffer.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::Detection;
use crate::frame::Frame;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;

/// Colors and sizes for overlays.
#[derive(Clone, Debug)]
pub struct RenderStyle {
    /// Outline thickness in pixels.
    pub thickness: u32,
    /// Integer upscale of the 5x7 glyphs.
    pub glyph_scale: u32,
    /// Box and label color for detections without a track id.
    pub box_color: Rgb<u8>,
    /// Label color for tracked detections. Boxes use the per-track color.
    pub track_label_color: Rgb<u8>,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            glyph_scale: 2,
            box_color: Rgb([0, 255, 0]),
            track_label_color: Rgb([255, 255, 0]),
        }
    }
}

/// Draws detections onto frames.
#[derive(Clone, Debug, Default)]
pub struct Renderer {
    style: RenderStyle,
    class_names: Vec<String>,
}

impl Renderer {
    pub fn new(style: RenderStyle, class_names: Vec<String>) -> Self {
        Self { style, class_names }
    }

    /// Label text: class name (or id) and confidence, or the track id when
    /// the detection is tracked.
    pub fn label(&self, det: &Detection) -> String {
        match det.track_id {
            Some(id) => format!("ID {} | {:.2}", id, det.confidence),
            None => {
                let class = self
                    .class_names
                    .get(det.class_id as usize)
                    .cloned()
                    .unwrap_or_else(|| det.class_id.to_string());
                format!("{} {:.2}", class, det.confidence)
            }
        }
    }

    /// Draw every detection. A frame with no detections is left untouched.
    pub fn render(&self, frame: &mut Frame, detections: &[Detection]) {
        if detections.is_empty() {
            return;
        }
        frame.edit_image(|image| {
            for det in detections {
                let (box_color, text_color) = match det.track_id {
                    Some(id) => (track_color(id), self.style.track_label_color),
                    None => (self.style.box_color, self.style.box_color),
                };
                self.draw_box(image, det, box_color);
                let text_height = GLYPH_HEIGHT * self.style.glyph_scale as i32;
                let mut y = det.bbox.y1 - text_height - 2;
                if y < 0 {
                    y = det.bbox.y1 + self.style.thickness as i32 + 1;
                }
                draw_label(
                    image,
                    &self.label(det),
                    det.bbox.x1,
                    y,
                    self.style.glyph_scale as i32,
                    text_color,
                );
            }
        });
    }

    fn draw_box(&self, image: &mut RgbImage, det: &Detection, color: Rgb<u8>) {
        let width = det.bbox.width().max(1) as u32;
        let height = det.bbox.height().max(1) as u32;
        for offset in 0..self.style.thickness as i32 {
            let rect = Rect::at(det.bbox.x1 - offset, det.bbox.y1 - offset)
                .of_size(width + 2 * offset as u32, height + 2 * offset as u32);
            draw_hollow_rect_mut(image, rect, color);
        }
    }
}

/// Color for a track id.
///
/// A pseudo-random generator seeded with the id picks each channel in
/// `0..=255`, so the same id gets the same color in every frame and run.
pub fn track_color(track_id: u64) -> Rgb<u8> {
    let mut rng = StdRng::seed_from_u64(track_id);
    Rgb([
        rng.gen_range(0..=255),
        rng.gen_range(0..=255),
        rng.gen_range(0..=255),
    ])
}

fn draw_label(image: &mut RgbImage, text: &str, x: i32, y: i32, scale: i32, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let advance = (GLYPH_WIDTH + 1) * scale;
    for (i, ch) in text.to_uppercase().chars().enumerate() {
        let origin_x = x + i as i32 * advance;
        if origin_x >= width {
            break;
        }
        let rows = glyph(ch);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + col * scale + dx;
                        let py = y + row as i32 * scale + dy;
                        if px >= 0 && py >= 0 && px < width && py < height {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

// 5x7 glyphs, one byte per row, bit 4 is the leftmost column.
const GLYPHS: &[(char, [u8; 7])] = &[
    ('A', [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    ('B', [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E]),
    ('C', [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E]),
    ('D', [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E]),
    ('E', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F]),
    ('F', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10]),
    ('G', [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F]),
    ('H', [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    ('I', [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('J', [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C]),
    ('K', [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11]),
    ('L', [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F]),
    ('M', [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11]),
    ('N', [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11]),
    ('O', [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('P', [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10]),
    ('Q', [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D]),
    ('R', [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11]),
    ('S', [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E]),
    ('T', [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
    ('U', [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('V', [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04]),
    ('W', [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11]),
    ('X', [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11]),
    ('Y', [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04]),
    ('Z', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F]),
    ('0', [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E]),
    ('1', [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('2', [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F]),
    ('3', [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E]),
    ('4', [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02]),
    ('5', [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E]),
    ('6', [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E]),
    ('7', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08]),
    ('8', [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E]),
    ('9', [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C]),
    (' ', [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
    ('-', [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00]),
    ('_', [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F]),
    ('.', [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C]),
    ('|', [0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
];

// Hollow square for anything not in the table.
const UNKNOWN_GLYPH: [u8; 7] = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

fn glyph(ch: char) -> [u8; 7] {
    GLYPHS
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, rows)| *rows)
        .unwrap_or(UNKNOWN_GLYPH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn blank(width: u32, height: u32) -> Frame {
        Frame::new(vec![0u8; (width * height * 3) as usize], width, height, 0).unwrap()
    }

    fn det(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection {
            bbox: BoundingBox { x1, y1, x2, y2 },
            confidence: 0.87,
            class_id: 1,
            track_id: None,
        }
    }

    #[test]
    fn no_detections_leaves_frame_unmodified() {
        let mut frame = blank(32, 32);
        let before = frame.clone();
        Renderer::default().render(&mut frame, &[]);
        assert_eq!(frame, before);
    }

    #[test]
    fn box_outline_is_drawn_in_green() {
        let mut frame = blank(64, 64);
        Renderer::default().render(&mut frame, &[det(20, 30, 40, 50)]);
        assert_eq!(frame.pixel(20, 40), Some([0, 255, 0]));
        assert_eq!(frame.pixel(39, 40), Some([0, 255, 0]));
        // Interior stays untouched.
        assert_eq!(frame.pixel(30, 40), Some([0, 0, 0]));
    }

    #[test]
    fn boxes_touching_edges_do_not_panic() {
        let mut frame = blank(16, 16);
        Renderer::default().render(
            &mut frame,
            &[det(0, 0, 16, 16), det(15, 15, 15, 15), det(0, 0, 0, 0)],
        );
        assert_eq!(frame.pixel(0, 0), Some([0, 255, 0]));
    }

    #[test]
    fn labels_use_class_names_or_track_ids() {
        let renderer = Renderer::new(RenderStyle::default(), vec!["person".into(), "tank".into()]);
        assert_eq!(renderer.label(&det(0, 0, 1, 1)), "tank 0.87");
        assert_eq!(renderer.label(&det(0, 0, 1, 1).with_track_id(12)), "ID 12 | 0.87");

        let unnamed = Detection {
            class_id: 5,
            ..det(0, 0, 1, 1)
        };
        assert_eq!(renderer.label(&unnamed), "5 0.87");
    }

    #[test]
    fn track_color_is_stable_per_id() {
        assert_eq!(track_color(7), track_color(7));
        assert_ne!(track_color(7), track_color(8));

        let mut a = blank(64, 64);
        let mut b = blank(64, 64);
        let tracked = det(10, 20, 40, 50).with_track_id(3);
        Renderer::default().render(&mut a, std::slice::from_ref(&tracked));
        Renderer::default().render(&mut b, &[tracked]);
        assert_eq!(a, b);
        let c = track_color(3);
        assert_eq!(a.pixel(10, 35), Some([c[0], c[1], c[2]]));
    }
}
