//! Image optimization and the per-collection image cache.

pub mod cache;
pub mod optimizer;

pub use cache::{ImageCache, ImageSet};
pub use optimizer::{DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, optimize, optimize_default};
