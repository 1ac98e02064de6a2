//! The map data model: layers with an open/close lifecycle, the image-layer
//! read pipeline, and the ordered layer collection.

mod image_layer;
pub use image_layer::*;

mod layer;
pub use layer::*;

mod map;
pub use map::*;

mod mem_cache;
pub use mem_cache::*;
