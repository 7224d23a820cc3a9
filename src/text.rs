//! Approximate text widths for legend layout.
//!
//! There is no font engine on the render path, so widths come from three
//! character classes measured at [`REFERENCE_FONT_SIZE`] and scaled linearly.

pub const REFERENCE_FONT_SIZE: f64 = 14.0;

const NARROW_WIDTH: f64 = 4.0;
const MEDIUM_WIDTH: f64 = 9.0;
const WIDE_WIDTH: f64 = 11.0;

pub fn char_width(ch: char) -> f64 {
    match ch {
        '1' | 'i' | 'j' | 'l' | 't' | ';' | ':' | ',' | '.' | '\'' | '!' => NARROW_WIDTH,
        'a' | 'b' | 'c' | 'd' | 'e' | 'f' | 'g' | 'h' | 'k' | 'n' | 'o' | 'p' | 'r' | 's'
        | 'u' | 'v' | 'x' | 'y' | 'z' | ' ' => MEDIUM_WIDTH,
        _ => WIDE_WIDTH,
    }
}

/// Estimated rendered width of `text` at `font_size`.
pub fn text_width(text: &str, font_size: f64) -> f64 {
    let units: f64 = text.chars().map(char_width).sum();
    units * font_size / REFERENCE_FONT_SIZE
}
