//! Section and grid geometry.
//!
//! Every extent is a power of two so coordinates split into
//! `(coord >> bits, coord & mask)` without division.

use serde::{Deserialize, Serialize};

use crate::error::VoxelError;

/// Upper bound on `x_bits + y_bits + z_bits + channel_bits` for one section.
pub const MAX_SECTION_BITS: u32 = 24;

/// Upper bound on the total section-count bits of a grid.
pub const MAX_GRID_BITS: u32 = 16;

/// Geometry of one section: `2^x_bits × 2^y_bits × 2^z_bits` voxels with
/// `2^channel_bits` attribute channels each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionShape {
    pub x_bits: u8,
    pub y_bits: u8,
    pub z_bits: u8,
    pub channel_bits: u8,
}

impl SectionShape {
    /// A single-channel shape.
    pub const fn new(x_bits: u8, y_bits: u8, z_bits: u8) -> Self {
        Self {
            x_bits,
            y_bits,
            z_bits,
            channel_bits: 0,
        }
    }

    /// Returns a copy with `2^channel_bits` channels.
    pub const fn with_channel_bits(mut self, channel_bits: u8) -> Self {
        self.channel_bits = channel_bits;
        self
    }

    /// Checks the total cell count stays within [`MAX_SECTION_BITS`].
    pub fn validate(&self) -> Result<(), VoxelError> {
        let total = u32::from(self.x_bits)
            + u32::from(self.y_bits)
            + u32::from(self.z_bits)
            + u32::from(self.channel_bits);
        if total > MAX_SECTION_BITS {
            return Err(VoxelError::InvalidShape(format!(
                "section needs {total} bits, at most {MAX_SECTION_BITS} allowed"
            )));
        }
        Ok(())
    }

    pub const fn size_x(&self) -> usize {
        1 << self.x_bits
    }

    pub const fn size_y(&self) -> usize {
        1 << self.y_bits
    }

    pub const fn size_z(&self) -> usize {
        1 << self.z_bits
    }

    pub const fn channels(&self) -> usize {
        1 << self.channel_bits
    }

    /// Number of voxels in the section.
    pub const fn voxels(&self) -> usize {
        1 << (self.x_bits + self.y_bits + self.z_bits)
    }

    /// Number of stored cells (voxels × channels).
    pub const fn cells(&self) -> usize {
        self.voxels() << self.channel_bits
    }

    /// Packed cell offset of `(x, y, z, channel)`.
    ///
    /// Channels of one voxel are adjacent; x varies fastest, then y, then z.
    pub fn offset(&self, x: usize, y: usize, z: usize, channel: usize) -> Result<usize, VoxelError> {
        if x >= self.size_x() || y >= self.size_y() || z >= self.size_z() || channel >= self.channels() {
            return Err(VoxelError::LocalOutOfRange { x, y, z, channel });
        }
        let voxel = (z * self.size_y() + y) * self.size_x() + x;
        Ok((voxel << self.channel_bits) | channel)
    }
}

/// Geometry of a grid: `2^x_section_bits × 2^y_section_bits × 2^z_section_bits`
/// sections of one [`SectionShape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub x_section_bits: u8,
    pub y_section_bits: u8,
    pub z_section_bits: u8,
    pub section: SectionShape,
}

impl GridShape {
    pub const fn new(x_section_bits: u8, y_section_bits: u8, z_section_bits: u8, section: SectionShape) -> Self {
        Self {
            x_section_bits,
            y_section_bits,
            z_section_bits,
            section,
        }
    }

    /// Checks both the section count and the section shape.
    pub fn validate(&self) -> Result<(), VoxelError> {
        let total =
            u32::from(self.x_section_bits) + u32::from(self.y_section_bits) + u32::from(self.z_section_bits);
        if total > MAX_GRID_BITS {
            return Err(VoxelError::InvalidShape(format!(
                "grid needs {total} section bits, at most {MAX_GRID_BITS} allowed"
            )));
        }
        self.section.validate()
    }

    /// Sections along X.
    pub const fn sections_x(&self) -> usize {
        1 << self.x_section_bits
    }

    pub const fn sections_y(&self) -> usize {
        1 << self.y_section_bits
    }

    pub const fn sections_z(&self) -> usize {
        1 << self.z_section_bits
    }

    pub const fn section_count(&self) -> usize {
        1 << (self.x_section_bits + self.y_section_bits + self.z_section_bits)
    }

    /// Flat index of a section: `(z · Ysz + y) · Xsz + x`.
    pub fn section_index(&self, x: usize, y: usize, z: usize) -> Result<usize, VoxelError> {
        if x >= self.sections_x() || y >= self.sections_y() || z >= self.sections_z() {
            return Err(VoxelError::SectionOutOfRange { x, y, z });
        }
        Ok((z * self.sections_y() + y) * self.sections_x() + x)
    }

    /// Voxel extent of the whole grid along each axis.
    pub const fn voxel_extent(&self) -> [usize; 3] {
        [
            self.sections_x() << self.section.x_bits,
            self.sections_y() << self.section.y_bits,
            self.sections_z() << self.section.z_bits,
        ]
    }

    /// Splits an absolute voxel coordinate into `(section coord, local coord)`.
    pub const fn split(&self, x: usize, y: usize, z: usize) -> ([usize; 3], [usize; 3]) {
        let s = &self.section;
        (
            [x >> s.x_bits, y >> s.y_bits, z >> s.z_bits],
            [x & (s.size_x() - 1), y & (s.size_y() - 1), z & (s.size_z() - 1)],
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_x_fastest() {
        let shape = SectionShape::new(2, 2, 2);
        assert_eq!(shape.cells(), 64);
        assert_eq!(shape.offset(0, 0, 0, 0).unwrap(), 0);
        assert_eq!(shape.offset(1, 0, 0, 0).unwrap(), 1);
        assert_eq!(shape.offset(0, 1, 0, 0).unwrap(), 4);
        assert_eq!(shape.offset(0, 0, 1, 0).unwrap(), 16);
        assert_eq!(shape.offset(1, 2, 3, 0).unwrap(), 57);
    }

    #[test]
    fn test_channels_are_adjacent() {
        let shape = SectionShape::new(1, 1, 1).with_channel_bits(1);
        assert_eq!(shape.cells(), 16);
        assert_eq!(shape.offset(1, 0, 0, 0).unwrap(), 2);
        assert_eq!(shape.offset(1, 0, 0, 1).unwrap(), 3);
    }

    #[test]
    fn test_offset_out_of_range() {
        let shape = SectionShape::new(2, 2, 2);
        assert!(matches!(
            shape.offset(4, 0, 0, 0),
            Err(VoxelError::LocalOutOfRange { x: 4, .. })
        ));
        assert!(matches!(
            shape.offset(0, 0, 0, 1),
            Err(VoxelError::LocalOutOfRange { channel: 1, .. })
        ));
    }

    #[test]
    fn test_grid_split_and_index() {
        let grid = GridShape::new(1, 3, 1, SectionShape::new(4, 4, 4));
        assert_eq!(grid.section_count(), 32);
        assert_eq!(grid.voxel_extent(), [32, 128, 32]);
        assert_eq!(grid.split(17, 35, 3), ([1, 2, 0], [1, 3, 3]));
        assert_eq!(grid.section_index(1, 2, 0).unwrap(), 5);
        assert_eq!(grid.section_index(0, 0, 1).unwrap(), 16);
        assert!(matches!(
            grid.section_index(0, 8, 0),
            Err(VoxelError::SectionOutOfRange { y: 8, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_oversized() {
        assert!(SectionShape::new(10, 10, 10).validate().is_err());
        assert!(GridShape::new(8, 8, 8, SectionShape::new(4, 4, 4)).validate().is_err());
        assert!(GridShape::new(1, 4, 1, SectionShape::new(4, 4, 4)).validate().is_ok());
    }
}
