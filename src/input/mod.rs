pub mod events;
pub mod handler;

// Re-export the essential types
pub use events::{EventQueue, InputEvent, MapEvent, MouseButton};
pub use handler::{InteractionState, ViewportController};
