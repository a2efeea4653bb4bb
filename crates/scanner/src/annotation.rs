//! Drawing and presentation of frames handed to consumers.
//!
//! Everything here works on copies; detections and the captured frame are
//! never modified.

use anyhow::{Result, anyhow};
use barcode_core::{Detection, Point};
use image::{ImageBuffer, Rgb, imageops};
use video_ingest::{Frame, FrameFormat};

use crate::settings::DisplaySettings;

type BgrImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

// Channel order is B, G, R.
const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

const GLYPH_ADVANCE: i32 = 6;
const GLYPH_HEIGHT: i32 = 7;
const LABEL_OFFSET: i32 = 10;

/// Copy `frame` and mark every detection with its outline and a `TYPE(payload)` label.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Result<Frame> {
    let mut image = to_image(frame.clone())?;

    for detection in detections {
        draw_polygon(&mut image, detection.polygon(), OUTLINE_COLOR);
    }

    for detection in detections {
        let Some(origin) = detection.bounding_origin() else {
            continue;
        };
        let label = detection.to_string();
        let label_x = origin.x;
        let label_y = (origin.y - LABEL_OFFSET).max(0);
        let text_width = label.chars().count() as i32 * GLYPH_ADVANCE;
        fill_rect(
            &mut image,
            label_x - 1,
            label_y - 1,
            label_x + text_width,
            label_y + GLYPH_HEIGHT,
            LABEL_BACKGROUND,
        );
        draw_label(&mut image, label_x, label_y, &label, LABEL_COLOR);
    }

    Ok(from_image(image, frame.timestamp_ms, frame.format))
}

/// Apply mirroring and the target resolution to an annotated frame.
pub fn present(frame: Frame, settings: &DisplaySettings) -> Result<Frame> {
    let needs_resize = settings
        .target_resolution
        .is_some_and(|target| target != frame.resolution());
    if !settings.mirror && !needs_resize {
        return Ok(frame);
    }

    let (timestamp_ms, format) = (frame.timestamp_ms, frame.format);
    let mut image = to_image(frame)?;
    if settings.mirror {
        imageops::flip_horizontal_in_place(&mut image);
    }
    if let Some((width, height)) = settings.target_resolution {
        if width == 0 || height == 0 {
            return Err(anyhow!("target resolution {width}x{height} is empty"));
        }
        if needs_resize {
            image = imageops::resize(&image, width, height, imageops::FilterType::Triangle);
        }
    }
    Ok(from_image(image, timestamp_ms, format))
}

fn to_image(frame: Frame) -> Result<BgrImage> {
    let (width, height) = frame.resolution();
    ImageBuffer::from_vec(width, height, frame.data)
        .ok_or_else(|| anyhow!("failed to convert {width}x{height} frame into image buffer"))
}

fn from_image(image: BgrImage, timestamp_ms: i64, format: FrameFormat) -> Frame {
    let (width, height) = image.dimensions();
    Frame {
        data: image.into_raw(),
        width,
        height,
        timestamp_ms,
        format,
    }
}

fn draw_polygon(image: &mut BgrImage, points: &[Point], color: Rgb<u8>) {
    if points.len() < 2 {
        return;
    }
    for (idx, start) in points.iter().enumerate() {
        let end = points[(idx + 1) % points.len()];
        draw_line(image, *start, end, color);
    }
}

/// Bresenham line, two pixels thick.
fn draw_line(image: &mut BgrImage, start: Point, end: Point, color: Rgb<u8>) {
    let dx = (end.x - start.x).abs();
    let dy = -(end.y - start.y).abs();
    let sx = if start.x < end.x { 1 } else { -1 };
    let sy = if start.y < end.y { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (start.x, start.y);

    loop {
        put_pixel(image, x, y, color);
        put_pixel(image, x + 1, y, color);
        put_pixel(image, x, y + 1, color);
        if x == end.x && y == end.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn put_pixel(image: &mut BgrImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_rect(image: &mut BgrImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    for y in y0.max(0)..=y1 {
        for x in x0.max(0)..=x1 {
            put_pixel(image, x, y, color);
        }
    }
}

fn draw_label(image: &mut BgrImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, &pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        put_pixel(image, x + col, y + row as i32, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        ':' => [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let data = (0..width * height)
            .flat_map(|i| [(i % 251) as u8, 0, 0])
            .collect();
        Frame::from_bgr(data, width, height)
    }

    #[test]
    fn annotation_draws_on_a_copy() {
        let frame = Frame::blank(64, 48);
        let detections = vec![Detection::new(
            "QRCODE",
            "a1",
            vec![
                Point::new(20, 20),
                Point::new(40, 20),
                Point::new(40, 40),
                Point::new(20, 40),
            ],
        )];
        let before = detections.clone();

        let annotated = annotate(&frame, &detections).expect("annotate");

        assert!(frame.data.iter().all(|&b| b == 0));
        assert_eq!(detections, before);
        assert_ne!(annotated.data, frame.data);
        let idx = (20 * 64 + 30) as usize * 3;
        assert_eq!(&annotated.data[idx..idx + 3], &[0, 255, 0]);
    }

    #[test]
    fn mirror_flips_rows() {
        let frame = gradient(4, 1);
        let mirrored = present(
            frame.clone(),
            &DisplaySettings {
                mirror: true,
                target_resolution: None,
            },
        )
        .expect("present");
        assert_eq!(mirrored.data[0], frame.data[9]);
        assert_eq!(mirrored.data[9], frame.data[0]);
    }

    #[test]
    fn target_resolution_resizes() {
        let presented = present(
            gradient(64, 48),
            &DisplaySettings {
                mirror: false,
                target_resolution: Some((32, 24)),
            },
        )
        .expect("present");
        assert_eq!(presented.resolution(), (32, 24));
        assert!(presented.is_well_formed());
    }

    #[test]
    fn default_settings_pass_frame_through() {
        let frame = gradient(5, 5);
        let presented = present(frame.clone(), &DisplaySettings::default()).expect("present");
        assert_eq!(presented, frame);
    }

    #[test]
    fn malformed_frame_is_an_error() {
        let mut frame = Frame::blank(4, 4);
        frame.data.truncate(5);
        assert!(annotate(&frame, &[]).is_err());
    }
}
