pub mod callbacks;
pub mod feature;
pub mod layer;
pub mod manager;
pub mod style;

pub use callbacks::{CallbackRegistry, CallbackTarget, ClickCallback, ClickKind};
pub use feature::{Feature, FeatureGeometry, FeatureId, GeometryKind};
pub use layer::{FeatureFilter, Layer};
pub use manager::LayerManager;
pub use style::{Color, FeatureStyle};
