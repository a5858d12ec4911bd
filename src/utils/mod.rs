//! Shared pixel and neighborhood helpers

pub mod color;
pub mod plane;

pub use color::{brightness, luminance, rgb_distance, rgb_f32, saturation};
pub use plane::LumaPlane;
