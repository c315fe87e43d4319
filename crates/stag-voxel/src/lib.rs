//! Bit-packed voxel attribute sections with uniform collapse, and the
//! fixed-size section grid that addresses them by absolute coordinate.

pub mod bit_packed;
pub mod error;
pub mod grid;
pub mod section;
pub mod shape;
pub mod short;

pub use bit_packed::BitWidth;
pub use error::VoxelError;
pub use grid::SectionGrid;
pub use section::{AttributeSection, ByteSection, EMPTY_VALUE, LockedSection, NibbleSection, SectionStorage};
pub use shape::{GridShape, SectionShape};
pub use short::ShortSection;
