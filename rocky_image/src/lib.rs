//! Raster handling for the terrain engine: the in-memory image type, the
//! geo-referenced image with crop and reproject, and the tile mosaic.

mod geo_image;
pub use geo_image::*;

// `self::` keeps the module distinct from the `image` codec crate
mod image;
pub use self::image::*;

mod mosaic;
pub use mosaic::*;
