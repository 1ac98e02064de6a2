//! # Rocky
//!
//! A terrain tile management core: quadtree addressing over tiling profiles,
//! an asynchronous-friendly layered raster pipeline with cross-profile
//! composition and caching, and a shared-geometry pool for tile meshes.
//!
//! The crates compose as:
//! - [`core`]: ellipsoid and SRS math, profiles, tile keys, the I/O envelope
//! - [`image`]: rasters, geo-referenced crop/reproject, the tile mosaic
//! - [`map`]: layers, the image read pipeline, the layer collection
//! - [`terrain`]: selection ladder, geometry pool, tile surface nodes
//!
//! ## Usage example
//!
//! ```
//! use rocky::{Engine, core::Profile, map::Map, terrain::TerrainSettings};
//!
//! let map = Map::new(Profile::global_geodetic());
//! let engine = Engine::new(&map, TerrainSettings::default()).unwrap();
//! assert!(engine.selection_info.num_lods() > 0);
//! ```

mod engine;
pub use engine::*;

pub use rocky_core as core;
pub use rocky_image as image;
pub use rocky_map as map;
pub use rocky_terrain as terrain;
