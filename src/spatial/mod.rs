pub mod index;

pub use hit_test::{resolve_click, Hit};
pub use index::FeatureIndex;
