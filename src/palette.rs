//! Dominant-color extraction for theming the booth from an event photo.
//!
//! The photo is downsampled to a 50x50 thumbnail, pixels are quantized
//! into coarse buckets, and the buckets are ranked by frequency. Up to
//! five mutually distinct colors survive; roles are then assigned: the
//! most frequent becomes the background, the best luminance contrast
//! becomes the text color, the rest fill button and accent slots.

use crate::settings::CustomColors;
use image::imageops::FilterType;
use image::DynamicImage;
use std::collections::HashMap;

const SAMPLE_EDGE: u32 = 50;
const QUANT_STEP: u16 = 32;
/// Minimum L1 distance in RGB space for two palette entries to count as
/// distinct.
const MIN_DISTINCT_DISTANCE: u16 = 60;
const MAX_PALETTE: usize = 5;

/// A quantized color. Channels may sit one step above 255 because
/// quantization rounds to the nearest bucket; clamping happens at hex
/// formatting, matching how the colors are compared for distinctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QuantColor {
    r: u16,
    g: u16,
    b: u16,
}

impl QuantColor {
    fn luminance(self) -> f64 {
        0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64
    }

    fn l1_distance(self, other: QuantColor) -> u16 {
        self.r.abs_diff(other.r) + self.g.abs_diff(other.g) + self.b.abs_diff(other.b)
    }

    fn to_hex(self) -> String {
        format!(
            "#{:02x}{:02x}{:02x}",
            self.r.min(255),
            self.g.min(255),
            self.b.min(255)
        )
    }
}

fn quantize(channel: u8) -> u16 {
    ((channel as f64 / QUANT_STEP as f64).round() as u16) * QUANT_STEP
}

/// Extract a four-role theme palette from an image.
pub fn extract_palette(image: &DynamicImage) -> CustomColors {
    let thumb = image
        .resize_exact(SAMPLE_EDGE, SAMPLE_EDGE, FilterType::Triangle)
        .to_rgb8();

    let mut counts: HashMap<(u16, u16, u16), u32> = HashMap::new();
    for pixel in thumb.pixels() {
        let key = (quantize(pixel[0]), quantize(pixel[1]), quantize(pixel[2]));
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut ranked: Vec<(QuantColor, u32)> = counts
        .into_iter()
        .map(|((r, g, b), n)| (QuantColor { r, g, b }, n))
        .collect();
    // frequency descending, channel order as a stable tie break
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| (a.0.r, a.0.g, a.0.b).cmp(&(b.0.r, b.0.g, b.0.b)))
    });

    let mut palette: Vec<QuantColor> = Vec::new();
    for (color, _) in ranked {
        if palette
            .iter()
            .all(|p| p.l1_distance(color) > MIN_DISTINCT_DISTANCE)
        {
            palette.push(color);
        }
        if palette.len() >= MAX_PALETTE {
            break;
        }
    }

    let bg = palette.first().copied().unwrap_or(QuantColor {
        r: 128,
        g: 128,
        b: 128,
    });

    let mut rest: Vec<QuantColor> = palette.iter().skip(1).copied().collect();
    rest.sort_by(|a, b| {
        let contrast_a = (a.luminance() - bg.luminance()).abs();
        let contrast_b = (b.luminance() - bg.luminance()).abs();
        contrast_b
            .partial_cmp(&contrast_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // monochrome photos still get readable text
    let text = rest.first().copied().unwrap_or_else(|| {
        let v = if bg.luminance() > 128.0 { 0 } else { 255 };
        QuantColor { r: v, g: v, b: v }
    });
    let btn = rest.get(1).copied().unwrap_or(text);
    let accent = rest.get(2).copied().or_else(|| rest.get(1).copied()).unwrap_or(text);

    CustomColors {
        bg_color: bg.to_hex(),
        text_color: text.to_hex(),
        btn_color: btn.to_hex(),
        accent_color: accent.to_hex(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_quantize_rounds_to_bucket() {
        assert_eq!(quantize(0), 0);
        assert_eq!(quantize(15), 0);
        assert_eq!(quantize(16), 32);
        assert_eq!(quantize(255), 256);
    }

    #[test]
    fn test_solid_dark_image_gets_white_text() {
        let palette = extract_palette(&solid(100, 100, [10, 10, 10]));
        assert_eq!(palette.bg_color, "#000000");
        assert_eq!(palette.text_color, "#ffffff");
        assert_eq!(palette.btn_color, palette.text_color);
        assert_eq!(palette.accent_color, palette.text_color);
    }

    #[test]
    fn test_solid_light_image_gets_black_text() {
        let palette = extract_palette(&solid(100, 100, [250, 250, 250]));
        assert_eq!(palette.bg_color, "#ffffff");
        assert_eq!(palette.text_color, "#000000");
    }

    #[test]
    fn test_dominant_color_becomes_background() {
        // left three quarters red, right quarter blue
        let mut img = RgbImage::from_pixel(100, 100, Rgb([200, 0, 0]));
        for y in 0..100 {
            for x in 75..100 {
                img.put_pixel(x, y, Rgb([0, 0, 200]));
            }
        }
        let palette = extract_palette(&DynamicImage::ImageRgb8(img));
        assert_eq!(palette.bg_color, "#c00000");
        assert_eq!(palette.text_color, "#0000c0");
    }

    #[test]
    fn test_channels_clamped_in_hex() {
        let palette = extract_palette(&solid(50, 50, [255, 255, 255]));
        // quantization rounds 255 up a bucket; hex output clamps it back
        assert_eq!(palette.bg_color, "#ffffff");
    }

    #[test]
    fn test_near_duplicate_shades_collapse() {
        // two shades closer than the distinctness floor
        let mut img = RgbImage::from_pixel(100, 100, Rgb([100, 100, 100]));
        for y in 0..100 {
            for x in 50..100 {
                img.put_pixel(x, y, Rgb([110, 110, 110]));
            }
        }
        let palette = extract_palette(&DynamicImage::ImageRgb8(img));
        // both shades quantize or collapse into one entry, so the text
        // color falls back to black or white
        assert!(palette.text_color == "#000000" || palette.text_color == "#ffffff");
    }
}
