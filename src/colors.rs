//! Named colors and conversion helpers.
//!
//! Colors are `palette::Srgb<f32>` in the 0.0-1.0 range throughout the crate.
//! [`PALETTE`] is the fixed list offered by the insert-step wizard.

use palette::Srgb;

pub const BLACK: Srgb = Srgb::new(0.0, 0.0, 0.0);
pub const WHITE: Srgb = Srgb::new(1.0, 1.0, 1.0);
pub const RED: Srgb = Srgb::new(1.0, 0.0, 0.0);
pub const GREEN: Srgb = Srgb::new(0.0, 1.0, 0.0);
pub const BLUE: Srgb = Srgb::new(0.0, 0.0, 1.0);
pub const YELLOW: Srgb = Srgb::new(1.0, 1.0, 0.0);
pub const CYAN: Srgb = Srgb::new(0.0, 1.0, 1.0);
pub const MAGENTA: Srgb = Srgb::new(1.0, 0.0, 1.0);

/// Colors selectable when inserting an LED step, with display names.
pub const PALETTE: [(&str, Srgb); 8] = [
    ("white", WHITE),
    ("red", RED),
    ("green", GREEN),
    ("blue", BLUE),
    ("yellow", YELLOW),
    ("cyan", CYAN),
    ("magenta", MAGENTA),
    ("black", BLACK),
];

/// Converts a color to 8-bit channels, clamping out-of-range components.
#[inline]
pub fn to_rgb8(color: Srgb) -> (u8, u8, u8) {
    let clamped = Srgb::new(
        color.red.clamp(0.0, 1.0),
        color.green.clamp(0.0, 1.0),
        color.blue.clamp(0.0, 1.0),
    );
    let rgb: Srgb<u8> = clamped.into_format();
    (rgb.red, rgb.green, rgb.blue)
}
