//! sRGB helpers: relative luminance, contrast ratio and hex conversion.
//!
//! Every function here is total. Malformed input degrades to a neutral value
//! instead of failing, so callers never need to handle errors.

use std::fmt;

/// Neutral gray used whenever a color cannot be determined.
pub const NEUTRAL_GRAY: Rgb = Rgb::new(128, 128, 128);

pub const BLACK: Rgb = Rgb::new(0, 0, 0);
pub const WHITE: Rgb = Rgb::new(255, 255, 255);

/// Luminance reported for channel values outside `0..=255`.
const FALLBACK_LUMINANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn luminance(self) -> f64 {
        relative_luminance(f64::from(self.r), f64::from(self.g), f64::from(self.b))
    }

    pub fn to_hex(self) -> String {
        rgb_to_hex(self)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// WCAG relative luminance of an sRGB color given as `0..=255` channels.
///
/// Channels that are not finite or fall outside `0..=255` make the whole
/// result `0.5`.
pub fn relative_luminance(r: f64, g: f64, b: f64) -> f64 {
    let channels = [r, g, b];
    if channels
        .iter()
        .any(|c| !c.is_finite() || !(0.0..=255.0).contains(c))
    {
        return FALLBACK_LUMINANCE;
    }

    let [r, g, b] = channels.map(linearize);
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

fn linearize(channel: f64) -> f64 {
    let c = channel / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// WCAG contrast ratio between two luminances, in `1.0..=21.0` for valid input.
pub fn contrast_ratio(lum1: f64, lum2: f64) -> f64 {
    if !lum1.is_finite() || !lum2.is_finite() {
        return 1.0;
    }

    let (lighter, darker) = if lum1 >= lum2 {
        (lum1, lum2)
    } else {
        (lum2, lum1)
    };
    let denominator = darker + 0.05;
    if denominator.abs() < 1e-9 {
        return 1.0;
    }
    (lighter + 0.05) / denominator
}

/// Parses `#rrggbb` (the `#` is optional). Anything else yields [`NEUTRAL_GRAY`].
pub fn hex_to_rgb(hex: &str) -> Rgb {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return NEUTRAL_GRAY;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) => Rgb::new(r, g, b),
        _ => NEUTRAL_GRAY,
    }
}

pub fn rgb_to_hex(rgb: Rgb) -> String {
    rgb.to_string()
}

/// Black on light backgrounds, white on dark ones.
pub fn binary_text_color(background: Rgb) -> Rgb {
    if background.luminance() > 0.5 {
        BLACK
    } else {
        WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contrast_of_equal_luminances_is_one() {
        for step in 0..=100 {
            let lum = f64::from(step) / 100.0;
            assert!((contrast_ratio(lum, lum) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn black_on_white_is_twenty_one() {
        let ratio = contrast_ratio(BLACK.luminance(), WHITE.luminance());
        assert!((ratio - 21.0).abs() < 1e-9, "got {ratio}");
        let swapped = contrast_ratio(WHITE.luminance(), BLACK.luminance());
        assert!((ratio - swapped).abs() < 1e-12);
    }

    #[test]
    fn luminance_stays_in_unit_range() {
        for v in (0..=255).step_by(5) {
            let v = f64::from(v);
            let lum = relative_luminance(v, 255.0 - v, v / 2.0);
            assert!((0.0..=1.0).contains(&lum), "lum {lum} out of range");
        }
        assert_eq!(BLACK.luminance(), 0.0);
        assert!((WHITE.luminance() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_channels_fail_soft() {
        assert_eq!(relative_luminance(-1.0, 0.0, 0.0), 0.5);
        assert_eq!(relative_luminance(0.0, 256.0, 0.0), 0.5);
        assert_eq!(relative_luminance(f64::NAN, 0.0, 0.0), 0.5);
        assert_eq!(contrast_ratio(f64::INFINITY, 0.2), 1.0);
    }

    #[test]
    fn degenerate_denominator_returns_one() {
        assert_eq!(contrast_ratio(-0.05, -0.05), 1.0);
    }

    #[test]
    fn hex_round_trips_every_channel_value() {
        for v in 0..=255u8 {
            let rgb = Rgb::new(v, 255 - v, v.wrapping_mul(7));
            assert_eq!(hex_to_rgb(&rgb_to_hex(rgb)), rgb);
        }
    }

    #[test]
    fn malformed_hex_is_neutral_gray() {
        assert_eq!(hex_to_rgb("zzzzzz"), NEUTRAL_GRAY);
        assert_eq!(hex_to_rgb("#abc"), NEUTRAL_GRAY);
        assert_eq!(hex_to_rgb(""), NEUTRAL_GRAY);
        assert_eq!(hex_to_rgb("#+1+2+3"), NEUTRAL_GRAY);
        assert_eq!(hex_to_rgb("#FFaa00"), Rgb::new(255, 170, 0));
        assert_eq!(hex_to_rgb("ffaa00"), Rgb::new(255, 170, 0));
    }

    #[test]
    fn hex_output_is_lowercase_with_hash() {
        assert_eq!(rgb_to_hex(Rgb::new(255, 170, 0)), "#ffaa00");
        assert_eq!(NEUTRAL_GRAY.to_hex(), "#808080");
    }

    #[test]
    fn binary_text_color_follows_luminance() {
        assert_eq!(binary_text_color(WHITE), BLACK);
        assert_eq!(binary_text_color(BLACK), WHITE);
        assert_eq!(binary_text_color(NEUTRAL_GRAY), WHITE);
    }
}
