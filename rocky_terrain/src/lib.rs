//! Terrain-side tile management: the LOD selection ladder, the shared tile
//! geometry pool, and the per-tile surface node.

mod geometry;
pub use geometry::*;

mod pool;
pub use pool::*;

mod selection_info;
pub use selection_info::*;

mod settings;
pub use settings::*;

mod surface;
pub use surface::*;
