//! Core data model for the terrain engine: ellipsoid math, spatial reference
//! systems, tiling profiles, quadtree tile keys, and the shared I/O envelope.

mod cache_policy;
pub use cache_policy::*;

mod config;
pub use config::*;

mod ellipsoid;
pub use ellipsoid::*;

mod gate;
pub use gate::*;

mod geo_extent;
pub use geo_extent::*;

mod io;
pub use io::*;

mod profile;
pub use profile::*;

mod signal;
pub use signal::*;

mod srs;
pub use srs::*;

mod tile_key;
pub use tile_key::*;
