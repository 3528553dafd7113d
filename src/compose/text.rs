//! Word wrapping and multi-line text rasterization.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;
use rusttype::{point, Font, Scale};

use super::font_cache::LoadedFont;

pub const DEFAULT_WRAP_WIDTH: usize = 20;

/// Extra pixels between wrapped lines.
pub const LINE_SPACING: i64 = 6;

/// Greedy length-based wrap: accumulate whitespace-separated words until the
/// joined line reaches `width` characters, then start a new line. Not
/// pixel-measured, so wide glyphs can overflow visually.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        if current.chars().count() >= width {
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Draw wrapped lines top-anchored at `(x, y)`.
pub fn draw_multiline(
    canvas: &mut RgbaImage,
    font: &LoadedFont,
    size: f32,
    x: i64,
    y: i64,
    color: Rgba<u8>,
    lines: &[String],
) {
    match font {
        LoadedFont::TrueType(font) => {
            let scale = Scale::uniform(size);
            let v_metrics = font.v_metrics(scale);
            let line_height =
                (v_metrics.ascent - v_metrics.descent + v_metrics.line_gap).ceil() as i64
                    + LINE_SPACING;
            let mut cursor_y = y;
            for line in lines {
                draw_line_truetype(canvas, font, scale, x, cursor_y, color, line);
                cursor_y += line_height;
            }
        }
        LoadedFont::BuiltIn => {
            let px = ((size / GLYPH_ROWS as f32).round() as i64).max(1);
            let line_height = GLYPH_ROWS as i64 * px + LINE_SPACING;
            let mut cursor_y = y;
            for line in lines {
                draw_line_builtin(canvas, px, x, cursor_y, color, line);
                cursor_y += line_height;
            }
        }
    }
}

fn draw_line_truetype(
    img: &mut RgbaImage,
    font: &Font<'static>,
    scale: Scale,
    x: i64,
    y: i64,
    color: Rgba<u8>,
    text: &str,
) {
    let v_metrics = font.v_metrics(scale);
    // anchor is top-left; rusttype positions glyphs at the baseline
    let baseline_y = y as f32 + v_metrics.ascent;
    let mut caret_x = x as f32;

    for ch in text.chars() {
        let glyph = font.glyph(ch).scaled(scale).positioned(point(caret_x, baseline_y));
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, v| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 {
                    return;
                }
                let (px, py) = (px as u32, py as u32);
                if px >= img.width() || py >= img.height() {
                    return;
                }
                let a = (v * 255.0) as u8;
                if a == 0 {
                    return;
                }
                let dst = img.get_pixel_mut(px, py);
                // alpha blend: src over dst
                let sa = a as f32 / 255.0;
                let inv = 1.0 - sa;
                dst.0[0] = (color.0[0] as f32 * sa + dst.0[0] as f32 * inv) as u8;
                dst.0[1] = (color.0[1] as f32 * sa + dst.0[1] as f32 * inv) as u8;
                dst.0[2] = (color.0[2] as f32 * sa + dst.0[2] as f32 * inv) as u8;
                dst.0[3] = 255;
            });
        }
        caret_x += glyph.unpositioned().h_metrics().advance_width;
    }
}

const GLYPH_ROWS: usize = 7;
const GLYPH_COLS: i64 = 5;

fn draw_line_builtin(img: &mut RgbaImage, px: i64, x: i64, y: i64, color: Rgba<u8>, text: &str) {
    let mut caret_x = x;
    for ch in text.chars() {
        let rows = builtin_glyph(ch);
        for (row_idx, row) in rows.iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if *row & (0b10000u8 >> col) == 0 {
                    continue;
                }
                fill_block(
                    img,
                    caret_x + col * px,
                    y + row_idx as i64 * px,
                    px,
                    color,
                );
            }
        }
        // one blank column between glyphs
        caret_x += (GLYPH_COLS + 1) * px;
    }
}

fn fill_block(img: &mut RgbaImage, x: i64, y: i64, size: i64, color: Rgba<u8>) {
    for dy in 0..size {
        for dx in 0..size {
            let px = x + dx;
            let py = y + dy;
            if px < 0 || py < 0 || px >= img.width() as i64 || py >= img.height() as i64 {
                continue;
            }
            img.put_pixel(px as u32, py as u32, Rgba([color.0[0], color.0[1], color.0[2], 255]));
        }
    }
}

// unknown glyphs render as a hollow box
const UNKNOWN_GLYPH: [u8; 7] = [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111];

fn builtin_glyph(ch: char) -> [u8; 7] {
    let folded = ch.to_ascii_uppercase();
    BUILTIN_GLYPHS.get(&folded).copied().unwrap_or(UNKNOWN_GLYPH)
}

static BUILTIN_GLYPHS: Lazy<HashMap<char, [u8; 7]>> = Lazy::new(|| {
    let table: &[(char, [u8; 7])] = &[
        (' ', [0, 0, 0, 0, 0, 0, 0]),
        ('A', [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        ('B', [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110]),
        ('C', [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
        ('D', [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100]),
        ('E', [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111]),
        ('F', [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000]),
        ('G', [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
        ('H', [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        ('I', [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        ('J', [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100]),
        ('K', [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001]),
        ('L', [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
        ('M', [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001]),
        ('N', [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001]),
        ('O', [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        ('P', [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
        ('Q', [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101]),
        ('R', [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
        ('S', [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110]),
        ('T', [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
        ('U', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        ('V', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100]),
        ('W', [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001]),
        ('X', [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001]),
        ('Y', [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100]),
        ('Z', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111]),
        ('0', [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
        ('1', [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        ('2', [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
        ('3', [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110]),
        ('4', [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
        ('5', [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
        ('6', [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
        ('7', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
        ('8', [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
        ('9', [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
        ('.', [0, 0, 0, 0, 0, 0b01100, 0b01100]),
        (',', [0, 0, 0, 0, 0, 0b01100, 0b01000]),
        (':', [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0]),
        ('!', [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0, 0b00100]),
        ('?', [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0, 0b00100]),
        ('$', [0b00100, 0b01111, 0b10100, 0b01110, 0b00101, 0b11110, 0b00100]),
        ('%', [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011]),
        ('\'', [0b00100, 0b00100, 0b01000, 0, 0, 0, 0]),
        ('-', [0, 0, 0, 0b11111, 0, 0, 0]),
        ('+', [0, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0]),
        ('/', [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000]),
        ('(', [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010]),
        (')', [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000]),
    ];
    table.iter().copied().collect()
});
