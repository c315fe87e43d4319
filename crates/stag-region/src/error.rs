//! Region store error types.

use stag_config::ConfigError;
use stag_tag::{ArchiveError, TagError};
use stag_voxel::VoxelError;

/// Errors raised while moving documents and grids in and out of a region.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// An entry failed to encode or decode.
    #[error("tag codec error: {0}")]
    Tag(#[from] TagError),

    /// The archive container is malformed.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A grid document did not fit the target grid.
    #[error("voxel error: {0}")]
    Voxel(#[from] VoxelError),

    /// The stored grid geometry differs from the target grid.
    #[error("entry {name} stores a different grid shape")]
    ShapeMismatch {
        /// Entry name.
        name: String,
    },

    /// A grid entry lacks its section list or geometry.
    #[error("entry {name} is not a grid document: {reason}")]
    NotAGrid {
        /// Entry name.
        name: String,
        /// Which part is missing or malformed.
        reason: &'static str,
    },

    /// Configuration could not be used.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Reading or writing the region file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
