//! Region files: voxel grids and free-form documents encoded with the tag
//! codec and bundled into one archive on disk.
//!
//! Reading a grid entry that fails to decode does not affect other entries;
//! [`RegionStore::load_grid_or_empty`] logs the failure and hands back an
//! empty grid.

pub mod error;
pub mod grid_doc;
pub mod store;

pub use error::RegionError;
pub use grid_doc::{SECTIONS_KEY, SHAPE_KEY, grid_document, load_grid_document};
pub use store::{RegionStore, encode_options, grid_shape};
