//! Per-voxel attribute sections with uniform collapse.
//!
//! A section is either *uniform* (no backing array, every cell equals the
//! default value) or *materialized* (a packed byte array). Writes that match
//! the default of a uniform section never allocate; [`compress`] turns a
//! materialized section whose cells all agree back into a uniform one.
//!
//! [`compress`]: AttributeSection::compress

use parking_lot::Mutex;
use stag_tag::{Compound, Tag};

use crate::bit_packed::BitWidth;
use crate::error::VoxelError;
use crate::shape::SectionShape;

/// Default value meaning "absent" (air). Uniform sections holding it are
/// empty and are omitted when saved.
pub const EMPTY_VALUE: u16 = 0;

/// Document key for the default of a uniform section.
pub const VALUE_KEY: &str = "Value";

/// Document key for the packed array of a materialized section.
pub const DATA_KEY: &str = "Data";

/// Shared contract of the 4-, 8- and 16-bit section variants.
///
/// `set` may be called concurrently from several threads; writers exclude
/// each other per section. Operations taking `&mut self` rely on the borrow
/// for exclusivity instead of a lock.
pub trait AttributeSection: Send + Sync {
    /// Cell width of this variant.
    const WIDTH: BitWidth;

    /// Creates an empty (uniform, [`EMPTY_VALUE`]) section.
    ///
    /// Fails with [`VoxelError::InvalidShape`] when `shape` does not validate.
    fn empty(shape: SectionShape) -> Result<Self, VoxelError>
    where
        Self: Sized;

    fn shape(&self) -> SectionShape;

    /// Reads one cell.
    fn get(&self, x: usize, y: usize, z: usize, channel: usize) -> Result<u16, VoxelError>;

    /// Writes one cell, materializing the section if needed.
    fn set(&self, x: usize, y: usize, z: usize, channel: usize, value: u16) -> Result<(), VoxelError>;

    /// [`set`](Self::set) without taking the section lock.
    fn set_unsync(&mut self, x: usize, y: usize, z: usize, channel: usize, value: u16) -> Result<(), VoxelError>;

    /// The uniform value. A materialized section keeps the value its array
    /// was pre-filled with ([`EMPTY_VALUE`] when loaded from saved data).
    fn default_value(&self) -> u16;

    /// `true` if no backing array is allocated.
    fn is_uniform(&self) -> bool;

    /// `true` iff uniform and the default is [`EMPTY_VALUE`].
    fn is_empty(&self) -> bool;

    /// Collapses a materialized section whose cells are all equal.
    ///
    /// Returns `true` if the section is uniform afterwards.
    fn compress(&mut self) -> bool;

    /// Saves the section: `None` if empty, `{Value}` if uniform, `{Data}`
    /// with the raw packed array otherwise.
    fn serialize(&self) -> Option<Compound>;

    /// Restores the section from a saved document; `None` or an empty
    /// compound resets it to empty.
    fn deserialize(&mut self, doc: Option<&Compound>) -> Result<(), VoxelError>;

    /// Resets to the empty state.
    fn clear(&mut self) {
        // An absent document always succeeds.
        let _ = self.deserialize(None);
    }
}

/// Storage state of a lock-guarded section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionStorage {
    Uniform(u16),
    Materialized { default: u16, bytes: Box<[u8]> },
}

impl SectionStorage {
    fn get(&self, width: BitWidth, offset: usize) -> u16 {
        match self {
            SectionStorage::Uniform(value) => *value,
            SectionStorage::Materialized { bytes, .. } => width.read(bytes, offset),
        }
    }

    fn set(&mut self, width: BitWidth, cells: usize, offset: usize, value: u16) {
        match self {
            SectionStorage::Uniform(default) if *default == value => {}
            SectionStorage::Uniform(default) => {
                let default = *default;
                let mut bytes = width.filled(cells, default).into_boxed_slice();
                width.write(&mut bytes, offset, value);
                *self = SectionStorage::Materialized { default, bytes };
            }
            SectionStorage::Materialized { bytes, .. } => width.write(bytes, offset, value),
        }
    }

    fn compress(&mut self, width: BitWidth, cells: usize) -> bool {
        match self {
            SectionStorage::Uniform(_) => true,
            SectionStorage::Materialized { bytes, .. } => match width.uniform_value(bytes, cells) {
                Some(value) => {
                    *self = SectionStorage::Uniform(value);
                    true
                }
                None => false,
            },
        }
    }
}

/// Builds the saved form of a section from its state.
pub(crate) fn serialize_state(default: u16, bytes: Option<&[u8]>) -> Option<Compound> {
    match bytes {
        Some(bytes) => Some(Compound::new().with(DATA_KEY, bytes.to_vec())),
        None if default == EMPTY_VALUE => None,
        None => Some(Compound::new().with(VALUE_KEY, default as i16)),
    }
}

/// Parsed saved form of a section.
pub(crate) enum SavedState {
    Uniform(u16),
    Materialized(Vec<u8>),
}

/// Validates a saved section document against `shape` and `width`.
pub(crate) fn parse_saved(
    doc: Option<&Compound>,
    shape: SectionShape,
    width: BitWidth,
) -> Result<SavedState, VoxelError> {
    let Some(doc) = doc.filter(|d| !d.is_empty()) else {
        return Ok(SavedState::Uniform(EMPTY_VALUE));
    };

    if let Some(tag) = doc.get(DATA_KEY) {
        let Tag::ByteArray(bytes) = tag else {
            return Err(VoxelError::MalformedDocument("section data is not a byte array"));
        };
        let expected = width.byte_len(shape.cells());
        if bytes.len() != expected {
            return Err(VoxelError::DataLength {
                expected,
                actual: bytes.len(),
            });
        }
        return Ok(SavedState::Materialized(bytes.clone()));
    }

    let raw = doc
        .get(VALUE_KEY)
        .ok_or(VoxelError::MalformedDocument("section has neither value nor data"))?
        .as_i64()
        .ok_or(VoxelError::MalformedDocument("section value is not an integer"))?;
    // 16-bit values are saved as a signed short.
    let value = match raw {
        -0x8000..=-1 => raw as i16 as u16,
        0..=0xFFFF => raw as u16,
        _ => return Err(VoxelError::MalformedDocument("section value does not fit 16 bits")),
    };
    if value > width.max_value() {
        return Err(VoxelError::ValueOutOfRange {
            value,
            max: width.max_value(),
        });
    }
    Ok(SavedState::Uniform(value))
}

pub(crate) fn check_value(width: BitWidth, value: u16) -> Result<(), VoxelError> {
    if value > width.max_value() {
        return Err(VoxelError::ValueOutOfRange {
            value,
            max: width.max_value(),
        });
    }
    Ok(())
}

/// A section whose reads and writes go through one mutex.
///
/// Instantiated as [`NibbleSection`] (4-bit) and [`ByteSection`] (8-bit).
#[derive(Debug)]
pub struct LockedSection<const BITS: u8> {
    shape: SectionShape,
    storage: Mutex<SectionStorage>,
}

/// 4-bit section; with one channel bit, the two channels of a voxel share a byte.
pub type NibbleSection = LockedSection<4>;

/// 8-bit section.
pub type ByteSection = LockedSection<8>;

impl<const BITS: u8> LockedSection<BITS> {
    const LOCKED_WIDTH: BitWidth = match BITS {
        4 => BitWidth::Four,
        8 => BitWidth::Eight,
        _ => panic!("locked sections support 4 or 8 bits"),
    };

    /// Snapshot of the storage state.
    pub fn storage(&self) -> SectionStorage {
        self.storage.lock().clone()
    }
}

impl<const BITS: u8> AttributeSection for LockedSection<BITS> {
    const WIDTH: BitWidth = Self::LOCKED_WIDTH;

    fn empty(shape: SectionShape) -> Result<Self, VoxelError> {
        shape.validate()?;
        Ok(Self {
            shape,
            storage: Mutex::new(SectionStorage::Uniform(EMPTY_VALUE)),
        })
    }

    fn shape(&self) -> SectionShape {
        self.shape
    }

    fn get(&self, x: usize, y: usize, z: usize, channel: usize) -> Result<u16, VoxelError> {
        let offset = self.shape.offset(x, y, z, channel)?;
        Ok(self.storage.lock().get(Self::WIDTH, offset))
    }

    fn set(&self, x: usize, y: usize, z: usize, channel: usize, value: u16) -> Result<(), VoxelError> {
        check_value(Self::WIDTH, value)?;
        let offset = self.shape.offset(x, y, z, channel)?;
        self.storage
            .lock()
            .set(Self::WIDTH, self.shape.cells(), offset, value);
        Ok(())
    }

    fn set_unsync(&mut self, x: usize, y: usize, z: usize, channel: usize, value: u16) -> Result<(), VoxelError> {
        check_value(Self::WIDTH, value)?;
        let offset = self.shape.offset(x, y, z, channel)?;
        let cells = self.shape.cells();
        self.storage.get_mut().set(Self::WIDTH, cells, offset, value);
        Ok(())
    }

    fn default_value(&self) -> u16 {
        match &*self.storage.lock() {
            SectionStorage::Uniform(value) => *value,
            SectionStorage::Materialized { default, .. } => *default,
        }
    }

    fn is_uniform(&self) -> bool {
        matches!(*self.storage.lock(), SectionStorage::Uniform(_))
    }

    fn is_empty(&self) -> bool {
        *self.storage.lock() == SectionStorage::Uniform(EMPTY_VALUE)
    }

    fn compress(&mut self) -> bool {
        let cells = self.shape.cells();
        let uniform = self.storage.get_mut().compress(Self::WIDTH, cells);
        if uniform {
            tracing::trace!(bits = BITS, "section collapsed to uniform");
        }
        uniform
    }

    fn serialize(&self) -> Option<Compound> {
        match &*self.storage.lock() {
            SectionStorage::Uniform(value) => serialize_state(*value, None),
            SectionStorage::Materialized { default, bytes } => serialize_state(*default, Some(&bytes[..])),
        }
    }

    fn deserialize(&mut self, doc: Option<&Compound>) -> Result<(), VoxelError> {
        let state = parse_saved(doc, self.shape, Self::WIDTH)?;
        *self.storage.get_mut() = match state {
            SavedState::Uniform(value) => SectionStorage::Uniform(value),
            SavedState::Materialized(bytes) => SectionStorage::Materialized {
                default: EMPTY_VALUE,
                bytes: bytes.into_boxed_slice(),
            },
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cube4() -> SectionShape {
        SectionShape::new(2, 2, 2)
    }

    fn fill<S: AttributeSection>(section: &S, value: u16) {
        let shape = section.shape();
        for z in 0..shape.size_z() {
            for y in 0..shape.size_y() {
                for x in 0..shape.size_x() {
                    for c in 0..shape.channels() {
                        section.set(x, y, z, c, value).unwrap();
                    }
                }
            }
        }
    }

    #[test]
    fn test_new_section_is_empty() {
        let section = ByteSection::empty(cube4()).unwrap();
        assert!(section.is_empty());
        assert!(section.is_uniform());
        assert_eq!(section.get(3, 3, 3, 0).unwrap(), EMPTY_VALUE);
        assert!(section.serialize().is_none());
    }

    #[test]
    fn test_writing_default_keeps_uniform() {
        let section = ByteSection::empty(cube4()).unwrap();
        section.set(1, 1, 1, 0, EMPTY_VALUE).unwrap();
        assert!(section.is_uniform());
        assert_eq!(section.storage(), SectionStorage::Uniform(0));
    }

    #[test]
    fn test_byte_section_packing_scenario() {
        let mut section = ByteSection::empty(cube4()).unwrap();
        fill(&section, 7);
        section.set(1, 2, 3, 0, 9).unwrap();

        assert!(!section.compress());
        let doc = section.serialize().expect("materialized section is saved");
        let data = doc.get_bytes(DATA_KEY).expect("data array");
        assert_eq!(data.len(), 64);
        assert_eq!(data.iter().filter(|&&b| b == 9).count(), 1);
        assert_eq!(data.iter().filter(|&&b| b == 7).count(), 63);
    }

    #[test]
    fn test_collapse_correctness() {
        for value in [0u16, 1, 5, 15] {
            let mut section = NibbleSection::empty(cube4().with_channel_bits(1)).unwrap();
            section.set(0, 0, 0, 1, 3).unwrap();
            fill(&section, value);
            assert!(section.compress());
            assert_eq!(section.default_value(), value);
            assert_eq!(section.is_empty(), value == EMPTY_VALUE, "value {value}");
        }
    }

    #[test]
    fn test_compress_idempotent() {
        let mut section = ByteSection::empty(cube4()).unwrap();
        fill(&section, 4);
        let first = section.compress();
        let state = section.storage();
        let second = section.compress();
        assert_eq!(first, second);
        assert_eq!(section.storage(), state);
        assert_eq!(section.default_value(), 4);

        section.set(0, 0, 0, 0, 1).unwrap();
        let first = section.compress();
        let state = section.storage();
        assert_eq!(first, section.compress());
        assert_eq!(section.storage(), state);
    }

    #[test]
    fn test_nibble_channels_share_byte() {
        let section = NibbleSection::empty(SectionShape::new(1, 1, 1).with_channel_bits(1)).unwrap();
        section.set(1, 0, 0, 0, 0xA).unwrap();
        section.set(1, 0, 0, 1, 0x5).unwrap();
        assert_eq!(section.get(1, 0, 0, 0).unwrap(), 0xA);
        assert_eq!(section.get(1, 0, 0, 1).unwrap(), 0x5);

        let doc = section.serialize().unwrap();
        let data = doc.get_bytes(DATA_KEY).unwrap();
        assert_eq!(data.len(), 8);
        assert_eq!(data[1], 0x5A);
    }

    #[test]
    fn test_value_out_of_range() {
        let section = NibbleSection::empty(cube4()).unwrap();
        assert!(matches!(
            section.set(0, 0, 0, 0, 16),
            Err(VoxelError::ValueOutOfRange { value: 16, max: 15 })
        ));
    }

    #[test]
    fn test_uniform_non_empty_saves_value_only() {
        let mut section = ByteSection::empty(cube4()).unwrap();
        fill(&section, 200);
        assert!(section.compress());
        let doc = section.serialize().unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get(VALUE_KEY), Some(&Tag::Short(200)));

        let mut restored = ByteSection::empty(cube4()).unwrap();
        restored.deserialize(Some(&doc)).unwrap();
        assert!(restored.is_uniform());
        assert_eq!(restored.get(2, 2, 2, 0).unwrap(), 200);
    }

    #[test]
    fn test_deserialize_roundtrip_and_reset() {
        let section = ByteSection::empty(cube4()).unwrap();
        section.set(3, 0, 1, 0, 42).unwrap();
        let doc = section.serialize();

        let mut restored = ByteSection::empty(cube4()).unwrap();
        restored.deserialize(doc.as_ref()).unwrap();
        assert_eq!(restored.get(3, 0, 1, 0).unwrap(), 42);
        assert_eq!(restored.storage(), section.storage());

        restored.deserialize(None).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_wrong_length() {
        let doc = Compound::new().with(DATA_KEY, vec![0u8; 10]);
        let mut section = ByteSection::empty(cube4()).unwrap();
        assert!(matches!(
            section.deserialize(Some(&doc)),
            Err(VoxelError::DataLength {
                expected: 64,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_empty_rejects_oversized_shape() {
        assert!(matches!(
            ByteSection::empty(SectionShape::new(70, 0, 0)),
            Err(VoxelError::InvalidShape(_))
        ));
        assert!(matches!(
            NibbleSection::empty(SectionShape::new(8, 8, 8).with_channel_bits(1)),
            Err(VoxelError::InvalidShape(_))
        ));
    }
}
