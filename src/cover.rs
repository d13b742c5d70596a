//! Spine colors derived from a book cover.
//!
//! The spine color is the mean color of the cover's left edge strip. The spine
//! text color is the palette swatch with the highest contrast against it, or
//! black/white when no swatch is readable enough. Nothing in here fails: every
//! problem degrades to [`CoverColors::fallback`] or a per-derivation default
//! and is logged.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context as _;
use image::{DynamicImage, GenericImageView as _};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::color::{self, NEUTRAL_GRAY, Rgb};
use crate::fetch::Fetch;

/// Palette quantization works on a thumbnail no larger than this.
const PALETTE_SAMPLE_EDGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverOptions {
    pub edge_width_percent: f64,
    pub min_contrast: f64,
    pub palette_size: usize,
    pub timeout: Duration,
}

impl Default for CoverOptions {
    fn default() -> Self {
        Self {
            edge_width_percent: 10.0,
            min_contrast: 4.5,
            palette_size: 6,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverColors {
    pub spine: Rgb,
    pub text: Rgb,
}

impl CoverColors {
    /// Gray spine with whichever of black/white reads better on it.
    pub fn fallback() -> Self {
        Self::fallback_for(NEUTRAL_GRAY)
    }

    fn fallback_for(spine: Rgb) -> Self {
        Self {
            spine,
            text: color::binary_text_color(spine),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub rgb: Rgb,
    pub pixels: u32,
}

/// Fetches the cover once and derives both colors from the same bytes.
pub async fn analyze_cover(
    fetcher: &dyn Fetch,
    url: Option<&Url>,
    options: CoverOptions,
    cancel: &CancellationToken,
) -> CoverColors {
    let Some(url) = url else {
        return CoverColors::fallback();
    };

    let fetched = tokio::select! {
        _ = cancel.cancelled() => Err(anyhow::anyhow!("run cancelled")),
        res = fetcher.fetch_bytes(url, options.timeout) => res,
    };
    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(cover = cover_label(url), "cover fetch failed: {err:#}");
            return CoverColors::fallback();
        }
    };

    let label = cover_label(url).to_owned();
    let joined =
        tokio::task::spawn_blocking(move || analyze_cover_bytes(&bytes, options, &label)).await;
    match joined {
        Ok(colors) => colors,
        Err(err) => {
            tracing::warn!(cover = cover_label(url), ?err, "cover analysis task failed");
            CoverColors::fallback()
        }
    }
}

/// Decodes `bytes` and derives both colors; `label` only appears in logs.
pub fn analyze_cover_bytes(bytes: &[u8], options: CoverOptions, label: &str) -> CoverColors {
    let img = match decode_cover(bytes) {
        Ok(img) => img,
        Err(err) => {
            tracing::warn!(cover = label, "cover decode failed: {err:#}");
            return CoverColors::fallback();
        }
    };

    let spine = edge_average_color(&img, options.edge_width_percent).unwrap_or_else(|| {
        tracing::warn!(cover = label, "cover too small for edge sampling");
        NEUTRAL_GRAY
    });

    let palette = extract_palette(&img, options.palette_size);
    if palette.is_empty() {
        tracing::warn!(cover = label, "cover palette is empty");
        return CoverColors::fallback_for(spine);
    }

    let candidates = palette.iter().map(|swatch| swatch.rgb).collect::<Vec<_>>();
    CoverColors {
        spine,
        text: max_contrast_color(&candidates, spine, options.min_contrast),
    }
}

fn decode_cover(bytes: &[u8]) -> anyhow::Result<DynamicImage> {
    if bytes.is_empty() {
        anyhow::bail!("empty image content");
    }
    image::load_from_memory(bytes).context("decode image")
}

/// Mean color of the left `edge_width_percent` of the image.
///
/// The strip is at least one pixel wide and never wider than the image.
/// Returns `None` for images one pixel wide or less, or with no rows.
pub fn edge_average_color(img: &DynamicImage, edge_width_percent: f64) -> Option<Rgb> {
    let (width, height) = img.dimensions();
    if width <= 1 || height == 0 {
        return None;
    }

    let percent = if edge_width_percent.is_finite() {
        edge_width_percent.max(0.0)
    } else {
        10.0
    };
    let strip = ((f64::from(width) * percent / 100.0) as u32).clamp(1, width);

    let edge = img.crop_imm(0, 0, strip, height).to_rgb8();
    let mut sums = [0_u64; 3];
    for pixel in edge.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
    }

    let count = u64::from(strip) * u64::from(height);
    let [r, g, b] = sums.map(|sum| mean_channel(sum, count));
    Some(Rgb::new(r, g, b))
}

fn mean_channel(sum: u64, count: u64) -> u8 {
    if count == 0 {
        return NEUTRAL_GRAY.r;
    }
    (sum as f64 / count as f64).round().clamp(0.0, 255.0) as u8
}

/// Up to `max_colors` dominant colors, most common first.
///
/// Pixels are bucketed by the top three bits of each channel; each swatch is
/// the mean of its bucket. Fully transparent pixels are ignored.
pub fn extract_palette(img: &DynamicImage, max_colors: usize) -> Vec<Swatch> {
    if max_colors == 0 {
        return Vec::new();
    }

    let (width, height) = img.dimensions();
    let sample = if width > PALETTE_SAMPLE_EDGE || height > PALETTE_SAMPLE_EDGE {
        img.thumbnail(PALETTE_SAMPLE_EDGE, PALETTE_SAMPLE_EDGE)
            .to_rgba8()
    } else {
        img.to_rgba8()
    };

    let mut buckets: HashMap<(u8, u8, u8), ([u64; 3], u32)> = HashMap::new();
    for pixel in sample.pixels() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue;
        }
        let entry = buckets.entry((r >> 5, g >> 5, b >> 5)).or_default();
        entry.0[0] += u64::from(r);
        entry.0[1] += u64::from(g);
        entry.0[2] += u64::from(b);
        entry.1 += 1;
    }

    let mut ranked = buckets.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|(a_key, (_, a_count)), (b_key, (_, b_count))| {
        b_count.cmp(a_count).then_with(|| a_key.cmp(b_key))
    });

    ranked
        .into_iter()
        .take(max_colors)
        .map(|(_, (sums, count))| {
            let [r, g, b] = sums.map(|sum| mean_channel(sum, u64::from(count)));
            Swatch {
                rgb: Rgb::new(r, g, b),
                pixels: count,
            }
        })
        .collect()
}

/// Picks the candidate with the highest contrast against `background`.
///
/// Ties keep the earliest candidate. If even the best candidate is below
/// `min_contrast`, black or white is returned based on the background.
pub fn max_contrast_color(candidates: &[Rgb], background: Rgb, min_contrast: f64) -> Rgb {
    let background_lum = background.luminance();

    let mut best: Option<(Rgb, f64)> = None;
    for &candidate in candidates {
        let contrast = color::contrast_ratio(background_lum, candidate.luminance());
        if best.is_none_or(|(_, highest)| contrast > highest) {
            best = Some((candidate, contrast));
        }
    }

    match best {
        Some((rgb, contrast)) if contrast >= min_contrast => rgb,
        _ => color::binary_text_color(background),
    }
}

fn cover_label(url: &Url) -> &str {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| url.as_str())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb as Pixel, RgbImage};

    use super::*;
    use crate::color::{BLACK, WHITE};

    fn two_tone(width: u32, height: u32, split: u32, left: [u8; 3], right: [u8; 3]) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < split { Pixel(left) } else { Pixel(right) }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn edge_color_averages_left_strip_only() {
        let img = two_tone(100, 20, 10, [200, 10, 10], [0, 0, 255]);
        assert_eq!(edge_average_color(&img, 10.0), Some(Rgb::new(200, 10, 10)));
    }

    #[test]
    fn edge_color_rounds_mean() {
        // Strip is 2px wide: one column of 0s and one of 255s.
        let img = two_tone(20, 4, 1, [0, 0, 0], [255, 255, 255]);
        assert_eq!(edge_average_color(&img, 10.0), Some(Rgb::new(128, 128, 128)));
    }

    #[test]
    fn edge_strip_is_at_least_one_pixel() {
        let img = two_tone(5, 5, 1, [10, 20, 30], [250, 250, 250]);
        assert_eq!(edge_average_color(&img, 1.0), Some(Rgb::new(10, 20, 30)));
    }

    #[test]
    fn edge_strip_is_clamped_to_width() {
        let img = two_tone(4, 2, 2, [0, 0, 0], [200, 200, 200]);
        assert_eq!(edge_average_color(&img, 400.0), Some(Rgb::new(100, 100, 100)));
    }

    #[test]
    fn tiny_images_have_no_edge_color() {
        let img = two_tone(1, 10, 1, [0, 0, 0], [0, 0, 0]);
        assert_eq!(edge_average_color(&img, 10.0), None);
    }

    #[test]
    fn grayscale_images_are_sampled_as_rgb() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(10, 10, image::Luma([40])));
        assert_eq!(edge_average_color(&img, 10.0), Some(Rgb::new(40, 40, 40)));
    }

    #[test]
    fn palette_is_ordered_by_frequency() {
        let img = two_tone(100, 100, 70, [250, 250, 250], [10, 10, 120]);
        let palette = extract_palette(&img, 6);
        assert_eq!(palette.len(), 2);
        assert_eq!(palette[0].rgb, Rgb::new(250, 250, 250));
        assert_eq!(palette[1].rgb, Rgb::new(10, 10, 120));
        assert!(palette[0].pixels > palette[1].pixels);
    }

    #[test]
    fn palette_respects_max_colors() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            Pixel([(x * 4) as u8, (y * 4) as u8, 90])
        }));
        assert_eq!(extract_palette(&img, 6).len(), 6);
        assert!(extract_palette(&img, 0).is_empty());
    }

    #[test]
    fn max_contrast_picks_highest_ratio() {
        let candidates = [Rgb::new(120, 120, 120), Rgb::new(250, 250, 250), WHITE];
        assert_eq!(max_contrast_color(&candidates, BLACK, 4.5), WHITE);
    }

    #[test]
    fn max_contrast_ties_keep_first() {
        let first = Rgb::new(255, 255, 255);
        let candidates = [first, first, Rgb::new(10, 10, 10)];
        assert_eq!(max_contrast_color(&candidates, BLACK, 4.5), first);
    }

    #[test]
    fn low_contrast_falls_back_to_binary_color() {
        let bg = Rgb::new(30, 30, 30);
        let candidates = [Rgb::new(40, 40, 40), Rgb::new(50, 50, 50)];
        assert_eq!(max_contrast_color(&candidates, bg, 4.5), WHITE);

        let light_bg = Rgb::new(240, 240, 240);
        assert_eq!(max_contrast_color(&[Rgb::new(230, 230, 230)], light_bg, 4.5), BLACK);
        assert_eq!(max_contrast_color(&[], light_bg, 4.5), BLACK);
    }

    #[test]
    fn analyze_bytes_derives_spine_and_text() {
        let img = two_tone(60, 90, 30, [15, 15, 40], [245, 240, 230]);
        let colors = analyze_cover_bytes(&png_bytes(&img), CoverOptions::default(), "test.png");
        assert_eq!(colors.spine, Rgb::new(15, 15, 40));
        assert_eq!(colors.text, Rgb::new(245, 240, 230));
    }

    #[test]
    fn garbage_bytes_fall_back() {
        let colors = analyze_cover_bytes(b"not an image", CoverOptions::default(), "x.jpg");
        assert_eq!(colors, CoverColors::fallback());
        assert_eq!(colors.spine.to_hex(), "#808080");
        assert_eq!(colors.text, WHITE);

        let empty = analyze_cover_bytes(&[], CoverOptions::default(), "x.jpg");
        assert_eq!(empty, CoverColors::fallback());
    }

    #[test]
    fn truncated_png_falls_back() {
        let img = two_tone(40, 40, 20, [0, 0, 0], [255, 255, 255]);
        let bytes = png_bytes(&img);
        let colors = analyze_cover_bytes(&bytes[..bytes.len() / 2], CoverOptions::default(), "t");
        assert_eq!(colors, CoverColors::fallback());
    }

    #[test]
    fn cover_label_uses_last_segment() -> anyhow::Result<()> {
        let url = Url::parse("https://img.example.com/books/123/cover.jpg")?;
        assert_eq!(cover_label(&url), "cover.jpg");
        Ok(())
    }
}
