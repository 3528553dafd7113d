//! Canvas composition: proportional fit-and-center of the product cut-out
//! plus positioned text fields, rendered onto a template background.

pub mod font_cache;
pub mod text;

use std::collections::BTreeMap;

use image::{imageops, GrayImage, ImageEncoder, Luma, Rgba, RgbaImage, RgbImage};
use thiserror::Error;

use crate::template::{Rect, TemplateSpec, TextFieldSpec};
use font_cache::FontCache;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid color: {0}")]
    InvalidColor(String),
    #[error("png encode failed: {0}")]
    Encode(String),
}

/// Uniform scale into a bounding box, aspect ratio preserved, never
/// distorted. Dimensions round to the nearest integer and stay >= 1.
pub fn fit_within(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let scaled_w = ((w as f64 * scale).round() as u32).max(1);
    let scaled_h = ((h as f64 * scale).round() as u32).max(1);
    (scaled_w, scaled_h)
}

/// Scale `overlay` to fit `area` and alpha-composite it centered within the
/// rectangle. Pixels landing outside `base` are clipped.
pub fn paste_centered(base: &mut RgbaImage, overlay: &RgbaImage, area: Rect) {
    let (scaled_w, scaled_h) = fit_within(overlay.width(), overlay.height(), area.width, area.height);
    let scaled = imageops::resize(overlay, scaled_w, scaled_h, imageops::FilterType::Lanczos3);
    let paste_x = area.x + (area.width as i64 - scaled_w as i64) / 2;
    let paste_y = area.y + (area.height as i64 - scaled_h as i64) / 2;
    overlay_alpha(base, &scaled, paste_x, paste_y);
}

pub fn overlay_alpha(base: &mut RgbaImage, over: &RgbaImage, x: i64, y: i64) {
    for oy in 0..over.height() {
        for ox in 0..over.width() {
            let bx = x + ox as i64;
            let by = y + oy as i64;
            if bx < 0 || by < 0 || bx >= base.width() as i64 || by >= base.height() as i64 {
                continue;
            }
            let p = over.get_pixel(ox, oy);
            let a = p.0[3] as f32 / 255.0;
            if a <= 0.0 {
                continue;
            }
            let dst = base.get_pixel_mut(bx as u32, by as u32);
            let inv = 1.0 - a;
            dst.0[0] = (p.0[0] as f32 * a + dst.0[0] as f32 * inv) as u8;
            dst.0[1] = (p.0[1] as f32 * a + dst.0[1] as f32 * inv) as u8;
            dst.0[2] = (p.0[2] as f32 * a + dst.0[2] as f32 * inv) as u8;
            dst.0[3] = 255;
        }
    }
}

pub fn hex_color(s: &str) -> Result<Rgba<u8>, RenderError> {
    let trimmed = s.trim().trim_start_matches('#');
    if trimmed.len() != 6 {
        return Err(RenderError::InvalidColor(s.to_string()));
    }
    let b = hex::decode(trimmed).map_err(|_| RenderError::InvalidColor(s.to_string()))?;
    Ok(Rgba([b[0], b[1], b[2], 255]))
}

/// Soften hard cut-out edges: a small Gaussian blur applied to the alpha
/// channel only, RGB content untouched.
pub fn soften_alpha_edges(img: &RgbaImage) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut alpha = GrayImage::new(w, h);
    for (x, y, p) in img.enumerate_pixels() {
        alpha.put_pixel(x, y, Luma([p.0[3]]));
    }
    let blurred = imageops::blur(&alpha, 2.0);
    let mut out = img.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        p.0[3] = blurred.get_pixel(x, y).0[0];
    }
    out
}

/// Drop the alpha channel for the final, fully-opaque artifact.
pub fn flatten_opaque(img: RgbaImage) -> RgbImage {
    image::DynamicImage::ImageRgba8(img).to_rgb8()
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Vec::new();
    let enc = image::codecs::png::PngEncoder::new(&mut buf);
    enc.write_image(img, img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(buf)
}

pub fn encode_png_rgba(img: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Vec::new();
    let enc = image::codecs::png::PngEncoder::new(&mut buf);
    enc.write_image(img, img.width(), img.height(), image::ExtendedColorType::Rgba8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Renders one template + product + text payload into a finished canvas.
/// Borrows the spec and product for the duration of the call; returns a new
/// opaque image.
pub struct Compositor {
    fonts: FontCache,
}

impl Compositor {
    pub fn new(fonts: FontCache) -> Self {
        Self { fonts }
    }

    pub fn render(
        &self,
        spec: &TemplateSpec,
        mut background: RgbaImage,
        product: &RgbaImage,
        payload: &BTreeMap<String, String>,
    ) -> Result<RgbImage, RenderError> {
        paste_centered(&mut background, product, spec.product_area);
        self.draw_text_fields(&mut background, &spec.text_fields, payload)?;
        Ok(flatten_opaque(background))
    }

    fn draw_text_fields(
        &self,
        canvas: &mut RgbaImage,
        fields: &BTreeMap<String, TextFieldSpec>,
        payload: &BTreeMap<String, String>,
    ) -> Result<(), RenderError> {
        for (key, field) in fields {
            let Some(content) = payload.get(key) else {
                continue;
            };
            if content.is_empty() {
                continue;
            }
            let color = hex_color(&field.color)?;
            // prices stay on one line; the threshold always exceeds the length
            let width = if key == "price" {
                content.chars().count() + 4
            } else {
                text::DEFAULT_WRAP_WIDTH
            };
            let lines = text::wrap_text(content, width);
            let font = self.fonts.get();
            text::draw_multiline(
                canvas,
                &font,
                field.size as f32,
                field.x,
                field.y,
                color,
                &lines,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(rgba))
    }

    #[test]
    fn fit_preserves_aspect_and_touches_a_bound() {
        let cases = [
            (400u32, 100u32, 200u32, 200u32),
            (100, 400, 200, 200),
            (333, 77, 120, 450),
            (50, 50, 300, 200),
            (1920, 1080, 640, 480),
            (3, 3, 2, 2),
        ];
        for (w, h, max_w, max_h) in cases {
            let (sw, sh) = fit_within(w, h, max_w, max_h);
            assert!(sw <= max_w && sh <= max_h, "({w},{h}) into ({max_w},{max_h})");
            assert!(
                sw == max_w || sh == max_h,
                "no wasted headroom for ({w},{h}) into ({max_w},{max_h}): got ({sw},{sh})"
            );
            let src_ratio = w as f64 / h as f64;
            let dst_ratio = sw as f64 / sh as f64;
            assert!(
                (src_ratio - dst_ratio).abs() / src_ratio < 0.05,
                "aspect drift for ({w},{h}): {src_ratio} vs {dst_ratio}"
            );
        }
    }

    #[test]
    fn fit_never_degenerates_to_zero() {
        let (w, h) = fit_within(1000, 10, 50, 50);
        assert_eq!(w, 50);
        assert!(h >= 1);
    }

    #[test]
    fn paste_is_centered_within_rounding() {
        let area = Rect { x: 100, y: 100, width: 200, height: 200 };
        let (sw, sh) = fit_within(400, 100, area.width, area.height);
        assert_eq!((sw, sh), (200, 50));
        let offset_x = area.x + (area.width as i64 - sw as i64) / 2;
        let offset_y = area.y + (area.height as i64 - sh as i64) / 2;
        assert_eq!((offset_x, offset_y), (100, 175));
        // scaled midpoint sits on the rectangle midpoint within 1 unit
        assert!((offset_x + sw as i64 / 2 - (area.x + area.width as i64 / 2)).abs() <= 1);
        assert!((offset_y + sh as i64 / 2 - (area.y + area.height as i64 / 2)).abs() <= 1);
    }

    #[test]
    fn paste_centered_composites_product_pixels() {
        let mut base = solid(400, 400, [0, 0, 255, 255]);
        let product = solid(400, 100, [255, 0, 0, 255]);
        paste_centered(&mut base, &product, Rect { x: 100, y: 100, width: 200, height: 200 });
        // inside the pasted 200x50 region at (100,175)
        assert_eq!(base.get_pixel(200, 200).0, [255, 0, 0, 255]);
        // just above it the background is untouched
        assert_eq!(base.get_pixel(200, 170).0, [0, 0, 255, 255]);
        assert_eq!(base.get_pixel(5, 5).0, [0, 0, 255, 255]);
    }

    #[test]
    fn transparent_product_pixels_let_background_through() {
        let mut base = solid(100, 100, [0, 0, 255, 255]);
        let product = solid(50, 50, [255, 0, 0, 0]);
        paste_centered(&mut base, &product, Rect { x: 20, y: 20, width: 50, height: 50 });
        assert_eq!(base.get_pixel(45, 45).0, [0, 0, 255, 255]);
    }

    #[test]
    fn overlay_clips_outside_base_bounds() {
        let mut base = solid(50, 50, [0, 0, 255, 255]);
        let over = solid(40, 40, [255, 0, 0, 255]);
        overlay_alpha(&mut base, &over, -20, -20);
        overlay_alpha(&mut base, &over, 40, 40);
        assert_eq!(base.get_pixel(10, 10).0, [255, 0, 0, 255]);
        assert_eq!(base.get_pixel(45, 45).0, [255, 0, 0, 255]);
        assert_eq!(base.get_pixel(30, 10).0, [0, 0, 255, 255]);
    }

    #[test]
    fn hex_color_accepts_hash_and_bare_forms() {
        assert_eq!(hex_color("#D7263D").unwrap().0, [0xD7, 0x26, 0x3D, 255]);
        assert_eq!(hex_color("ffffff").unwrap().0, [255, 255, 255, 255]);
        assert!(hex_color("#fff").is_err());
        assert!(hex_color("not-a-color").is_err());
    }

    #[test]
    fn soften_alpha_edges_keeps_rgb_and_smears_alpha() {
        let mut img = solid(20, 20, [200, 50, 10, 0]);
        for y in 5..15 {
            for x in 5..15 {
                img.put_pixel(x, y, Rgba([200, 50, 10, 255]));
            }
        }
        let out = soften_alpha_edges(&img);
        assert_eq!(out.dimensions(), (20, 20));
        for (o, s) in out.pixels().zip(img.pixels()) {
            assert_eq!(&o.0[..3], &s.0[..3]);
        }
        // the hard edge at x=4/x=5 is now a gradient
        let edge = out.get_pixel(4, 10).0[3];
        assert!(edge > 0 && edge < 255, "edge alpha should be partial, got {edge}");
    }

    #[test]
    fn flatten_produces_opaque_rgb() {
        let img = solid(4, 4, [10, 20, 30, 128]);
        let flat = flatten_opaque(img);
        assert_eq!(flat.get_pixel(0, 0).0, [10, 20, 30]);
    }

    fn test_spec(fields: BTreeMap<String, TextFieldSpec>) -> TemplateSpec {
        TemplateSpec {
            id: "t".into(),
            name: "t".into(),
            template_path: "unused.png".into(),
            product_area: Rect { x: 100, y: 100, width: 200, height: 200 },
            text_fields: fields,
        }
    }

    fn field(x: i64, y: i64, size: u32, color: &str) -> TextFieldSpec {
        TextFieldSpec { x, y, size, color: color.into() }
    }

    #[test]
    fn render_end_to_end_pastes_and_draws() {
        let mut fields = BTreeMap::new();
        fields.insert("product_name".to_string(), field(10, 10, 21, "#FFFFFF"));
        fields.insert("price".to_string(), field(10, 350, 21, "#FFFFFF"));
        let spec = test_spec(fields);

        let background = solid(400, 400, [0, 0, 255, 255]);
        let product = solid(400, 100, [255, 0, 0, 255]);

        let mut payload = BTreeMap::new();
        payload.insert("product_name".to_string(), "Widget".to_string());
        payload.insert("price".to_string(), String::new());

        let compositor = Compositor::new(FontCache::with_candidates(Vec::new()));
        let out = compositor.render(&spec, background, &product, &payload).unwrap();

        assert_eq!(out.dimensions(), (400, 400));
        // product landed at (100,175) sized 200x50
        assert_eq!(out.get_pixel(200, 200).0, [255, 0, 0]);
        assert_eq!(out.get_pixel(200, 170).0, [0, 0, 255]);
        // product_name drew white pixels near its anchor
        let mut lit = 0;
        for y in 10..40 {
            for x in 10..120 {
                if out.get_pixel(x, y).0 == [255, 255, 255] {
                    lit += 1;
                }
            }
        }
        assert!(lit > 0, "expected product_name glyphs on the canvas");
        // empty price content drew nothing at its anchor
        for y in 350..380 {
            for x in 10..120 {
                assert_eq!(out.get_pixel(x, y).0, [0, 0, 255]);
            }
        }
    }

    #[test]
    fn render_skips_payload_keys_without_field_spec() {
        let spec = test_spec(BTreeMap::new());
        let background = solid(400, 400, [0, 0, 255, 255]);
        let product = solid(10, 10, [255, 0, 0, 255]);
        let mut payload = BTreeMap::new();
        payload.insert("product_name".to_string(), "Widget".to_string());

        let compositor = Compositor::new(FontCache::with_candidates(Vec::new()));
        let out = compositor.render(&spec, background, &product, &payload).unwrap();
        // nothing but the pasted product: corners stay background blue
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[test]
    fn render_surfaces_invalid_field_color() {
        let mut fields = BTreeMap::new();
        fields.insert("product_name".to_string(), field(10, 10, 21, "chartreuse"));
        let spec = test_spec(fields);
        let background = solid(64, 64, [0, 0, 255, 255]);
        let product = solid(10, 10, [255, 0, 0, 255]);
        let mut payload = BTreeMap::new();
        payload.insert("product_name".to_string(), "Widget".to_string());

        let compositor = Compositor::new(FontCache::with_candidates(Vec::new()));
        let err = compositor.render(&spec, background, &product, &payload).unwrap_err();
        assert!(matches!(err, RenderError::InvalidColor(_)));
    }

    #[test]
    fn encode_png_round_trips() {
        let img = flatten_opaque(solid(8, 6, [1, 2, 3, 255]));
        let png = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(4, 3).0, [1, 2, 3]);
    }
}
