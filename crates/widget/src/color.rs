//! Hex color validation and readable text color selection

/// Text color used on light backgrounds
pub const BLACK: &str = "#000000";

/// Text color used on dark backgrounds, and for anything unparseable
pub const WHITE: &str = "#ffffff";

/// Backgrounds brighter than this get black text
const LUMINANCE_THRESHOLD: f64 = 0.55;

/// Validate a `#rrggbb` color, returning it lowercased, or `fallback`.
///
/// Surrounding whitespace is ignored. Short forms (`#fff`), names and
/// values without the leading `#` are rejected.
pub fn clamp_hex_color(value: &str, fallback: &str) -> String {
    let v = value.trim();
    if is_hex6(v) {
        v.to_ascii_lowercase()
    } else {
        fallback.to_string()
    }
}

/// True for `#` followed by exactly six hex digits
pub fn is_hex6(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(digits) => digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Decode a six-digit hex color (leading `#` optional) into RGB channels
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let h = hex.strip_prefix('#').unwrap_or(hex);
    if h.len() != 6 || !h.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| {
        h.get(range).and_then(|s| u8::from_str_radix(s, 16).ok())
    };

    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Relative luminance of an sRGB color, in `[0, 1]`
pub fn relative_luminance(r: u8, g: u8, b: u8) -> f64 {
    fn linear(channel: u8) -> f64 {
        let v = f64::from(channel) / 255.0;
        if v <= 0.04045 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    }

    0.2126 * linear(r) + 0.7152 * linear(g) + 0.0722 * linear(b)
}

/// Pick black or white text for the given background color.
///
/// Malformed input yields white.
pub fn pick_readable_text_color(background: &str) -> &'static str {
    match hex_to_rgb(background) {
        Some((r, g, b)) if relative_luminance(r, g, b) > LUMINANCE_THRESHOLD => BLACK,
        _ => WHITE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes() {
        assert_eq!(pick_readable_text_color("#ffffff"), BLACK);
        assert_eq!(pick_readable_text_color("#000000"), WHITE);
    }

    #[test]
    fn test_threshold_is_strict() {
        // pure green is bright, pure blue is dark
        assert_eq!(pick_readable_text_color("#00ff00"), BLACK);
        assert_eq!(pick_readable_text_color("#0000ff"), WHITE);
        // mid grey sits well under the threshold
        assert_eq!(pick_readable_text_color("#808080"), WHITE);
        // #c8c8c8 is about 0.58
        assert_eq!(pick_readable_text_color("c8c8c8"), BLACK);
    }

    #[test]
    fn test_malformed_input_is_white() {
        assert_eq!(pick_readable_text_color(""), WHITE);
        assert_eq!(pick_readable_text_color("#fff"), WHITE);
        assert_eq!(pick_readable_text_color("#gggggg"), WHITE);
        assert_eq!(pick_readable_text_color("#ffffff00"), WHITE);
    }

    #[test]
    fn test_luminance_bounds() {
        assert!(relative_luminance(0, 0, 0).abs() < 1e-12);
        assert!((relative_luminance(255, 255, 255) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_hex_color() {
        assert_eq!(clamp_hex_color(" #AbCdEf ", "#000000"), "#abcdef");
        assert_eq!(clamp_hex_color("abcdef", "#111111"), "#111111");
        assert_eq!(clamp_hex_color("", "#222222"), "#222222");
        assert_eq!(clamp_hex_color("#12345", "#333333"), "#333333");
    }

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb("#ff8000"), Some((255, 128, 0)));
        assert_eq!(hex_to_rgb("ff8000"), Some((255, 128, 0)));
        assert_eq!(hex_to_rgb("#ff80"), None);
    }
}
