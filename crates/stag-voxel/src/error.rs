//! Voxel storage error types.

/// Errors raised by section and grid access or by loading saved sections.
#[derive(Debug, thiserror::Error)]
pub enum VoxelError {
    /// A section coordinate lies outside the grid.
    #[error("section ({x}, {y}, {z}) is outside the grid")]
    SectionOutOfRange {
        /// Section X coordinate.
        x: usize,
        /// Section Y coordinate.
        y: usize,
        /// Section Z coordinate.
        z: usize,
    },

    /// A local coordinate or channel lies outside the section shape.
    #[error("local position ({x}, {y}, {z}) channel {channel} is outside the section")]
    LocalOutOfRange {
        /// Local X coordinate.
        x: usize,
        /// Local Y coordinate.
        y: usize,
        /// Local Z coordinate.
        z: usize,
        /// Channel index.
        channel: usize,
    },

    /// The value does not fit the section's bit width.
    #[error("value {value} exceeds maximum {max}")]
    ValueOutOfRange {
        /// The rejected value.
        value: u16,
        /// Largest storable value.
        max: u16,
    },

    /// The requested geometry is too large or otherwise unusable.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// A saved byte array does not match the section geometry.
    #[error("section data has {actual} bytes, expected {expected}")]
    DataLength {
        /// Byte length implied by the section shape.
        expected: usize,
        /// Byte length found in the document.
        actual: usize,
    },

    /// A saved section document has neither a value nor a data array, or a
    /// field of the wrong kind.
    #[error("malformed section document: {0}")]
    MalformedDocument(&'static str),
}
