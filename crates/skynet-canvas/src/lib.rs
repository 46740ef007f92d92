pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::CanvasStoreError;
pub use store::CanvasStore;
pub use types::{Canvas, CanvasElement, CanvasFrame, ElementFilter, ElementUpdate};
