//! Basic numerical concepts used throughout the program

#![allow(missing_docs)]

// Floating-point precision is configured here
#[cfg(feature = "f32")]
pub type Float = f32;
#[cfg(not(feature = "f32"))]
pub type Float = f64;

/// 2D vectors of reals, used for transverse positions and track slopes
pub type Vector2 = nalgebra::Vector2<Float>;

/// Value used by the text formats to flag an unknown or unmeasured quantity
pub const SENTINEL: i32 = -999;

/// Decode an optional float from its text-format representation
pub fn float_from_text(x: Float) -> Option<Float> {
    (x != SENTINEL as Float).then_some(x)
}

/// Encode an optional float into its text-format representation
pub fn float_to_text(x: Option<Float>) -> Float {
    x.unwrap_or(SENTINEL as Float)
}

/// Decode an optional integer from its text-format representation
pub fn int_from_text(x: i32) -> Option<i32> {
    (x != SENTINEL).then_some(x)
}

/// Encode an optional integer into its text-format representation
pub fn int_to_text(x: Option<i32>) -> i32 {
    x.unwrap_or(SENTINEL)
}
