//! 16-bit section with an optimistic (seqlock) read path.
//!
//! Writers serialize on `write_lock` and bump `version` to an odd value
//! before touching any cell byte and back to even afterwards. Readers sample
//! `version`, read the two bytes of the cell, sample `version` again, and
//! accept the value only if both samples are equal and even. A failed
//! validation falls back to a read under `write_lock`.
//!
//! Memory ordering:
//! - writer: `fetch_add(1, Relaxed)` then a `Release` fence before the byte
//!   stores, `fetch_add(1, Release)` after them;
//! - reader: `load(Acquire)` before the byte loads, an `Acquire` fence then
//!   `load(Relaxed)` after them.
//!
//! Cell bytes are atomics so a racing read is never undefined behaviour,
//! only rejected by the version check.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU16, AtomicU64, Ordering, fence};

use parking_lot::Mutex;
use stag_tag::Compound;

use crate::bit_packed::BitWidth;
use crate::error::VoxelError;
use crate::section::{AttributeSection, EMPTY_VALUE, SavedState, check_value, parse_saved, serialize_state};
use crate::shape::SectionShape;

/// Optimistic attempts before a read takes the lock.
const OPTIMISTIC_READ_ATTEMPTS: usize = 4;

/// A 16-bit attribute section.
#[derive(Debug)]
pub struct ShortSection {
    shape: SectionShape,
    write_lock: Mutex<()>,
    version: AtomicU64,
    default: AtomicU16,
    /// Absent while uniform. Only ever replaced through `&mut self`.
    cells: OnceLock<Box<[AtomicU8]>>,
}

impl ShortSection {
    /// Current value of the write counter. Even while no write is in progress.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn allocate(cells: usize, value: u16) -> Box<[AtomicU8]> {
        BitWidth::Sixteen
            .filled(cells, value)
            .into_iter()
            .map(AtomicU8::new)
            .collect()
    }

    fn load_cell(&self, offset: usize) -> u16 {
        match self.cells.get() {
            Some(cells) => u16::from_be_bytes([
                cells[offset * 2].load(Ordering::Relaxed),
                cells[offset * 2 + 1].load(Ordering::Relaxed),
            ]),
            None => self.default.load(Ordering::Relaxed),
        }
    }

    fn try_optimistic_read(&self, offset: usize) -> Option<u16> {
        let before = self.version.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }
        let value = self.load_cell(offset);
        fence(Ordering::Acquire);
        let after = self.version.load(Ordering::Relaxed);
        (before == after).then_some(value)
    }

    /// Writes one cell. The caller holds `write_lock` or `&mut self`.
    fn write_cell(&self, offset: usize, value: u16) {
        if self.cells.get().is_none() && value == self.default.load(Ordering::Relaxed) {
            return;
        }

        self.version.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);

        let default = self.default.load(Ordering::Relaxed);
        let cells = self
            .cells
            .get_or_init(|| Self::allocate(self.shape.cells(), default));
        let [hi, lo] = value.to_be_bytes();
        cells[offset * 2].store(hi, Ordering::Relaxed);
        cells[offset * 2 + 1].store(lo, Ordering::Relaxed);

        self.version.fetch_add(1, Ordering::Release);
    }

    fn packed_bytes(cells: &[AtomicU8]) -> Vec<u8> {
        cells.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}

impl AttributeSection for ShortSection {
    const WIDTH: BitWidth = BitWidth::Sixteen;

    fn empty(shape: SectionShape) -> Result<Self, VoxelError> {
        shape.validate()?;
        Ok(Self {
            shape,
            write_lock: Mutex::new(()),
            version: AtomicU64::new(0),
            default: AtomicU16::new(EMPTY_VALUE),
            cells: OnceLock::new(),
        })
    }

    fn shape(&self) -> SectionShape {
        self.shape
    }

    fn get(&self, x: usize, y: usize, z: usize, channel: usize) -> Result<u16, VoxelError> {
        let offset = self.shape.offset(x, y, z, channel)?;
        for _ in 0..OPTIMISTIC_READ_ATTEMPTS {
            if let Some(value) = self.try_optimistic_read(offset) {
                return Ok(value);
            }
            std::hint::spin_loop();
        }
        let _guard = self.write_lock.lock();
        Ok(self.load_cell(offset))
    }

    fn set(&self, x: usize, y: usize, z: usize, channel: usize, value: u16) -> Result<(), VoxelError> {
        check_value(Self::WIDTH, value)?;
        let offset = self.shape.offset(x, y, z, channel)?;
        let _guard = self.write_lock.lock();
        self.write_cell(offset, value);
        Ok(())
    }

    fn set_unsync(&mut self, x: usize, y: usize, z: usize, channel: usize, value: u16) -> Result<(), VoxelError> {
        check_value(Self::WIDTH, value)?;
        let offset = self.shape.offset(x, y, z, channel)?;
        self.write_cell(offset, value);
        Ok(())
    }

    fn default_value(&self) -> u16 {
        self.default.load(Ordering::Relaxed)
    }

    fn is_uniform(&self) -> bool {
        self.cells.get().is_none()
    }

    fn is_empty(&self) -> bool {
        self.is_uniform() && self.default_value() == EMPTY_VALUE
    }

    fn compress(&mut self) -> bool {
        let cells = self.shape.cells();
        let Some(array) = self.cells.get_mut() else {
            return true;
        };
        let bytes = Self::packed_bytes(array);
        match Self::WIDTH.uniform_value(&bytes, cells) {
            Some(value) => {
                *self.default.get_mut() = value;
                self.cells.take();
                tracing::trace!(value, "16-bit section collapsed to uniform");
                true
            }
            None => false,
        }
    }

    fn serialize(&self) -> Option<Compound> {
        let _guard = self.write_lock.lock();
        let bytes = self.cells.get().map(|cells| Self::packed_bytes(cells));
        serialize_state(self.default_value(), bytes.as_deref())
    }

    fn deserialize(&mut self, doc: Option<&Compound>) -> Result<(), VoxelError> {
        let state = parse_saved(doc, self.shape, Self::WIDTH)?;
        match state {
            SavedState::Uniform(value) => {
                *self.default.get_mut() = value;
                self.cells.take();
            }
            SavedState::Materialized(bytes) => {
                *self.default.get_mut() = EMPTY_VALUE;
                self.cells = OnceLock::from(bytes.into_iter().map(AtomicU8::new).collect::<Box<[AtomicU8]>>());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
