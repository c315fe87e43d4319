//! Byte-level packing of fixed-width cell values.
//!
//! Packed arrays are plain `[u8]` so they can be stored verbatim in a
//! document's byte array:
//!
//! | Width | Layout                                                      |
//! |-------|-------------------------------------------------------------|
//! | 4     | two cells per byte; even offsets low nibble, odd high nibble |
//! | 8     | one cell per byte                                           |
//! | 16    | two bytes per cell, big-endian                              |

use serde::{Deserialize, Serialize};

/// Bit width of a section's cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitWidth {
    Four,
    Eight,
    Sixteen,
}

impl BitWidth {
    /// Bits per cell.
    pub const fn bits(self) -> u8 {
        match self {
            BitWidth::Four => 4,
            BitWidth::Eight => 8,
            BitWidth::Sixteen => 16,
        }
    }

    /// Largest value a cell can hold.
    pub const fn max_value(self) -> u16 {
        match self {
            BitWidth::Four => 0x0F,
            BitWidth::Eight => 0xFF,
            BitWidth::Sixteen => 0xFFFF,
        }
    }

    /// Number of bytes needed for `cells` packed values.
    pub const fn byte_len(self, cells: usize) -> usize {
        match self {
            BitWidth::Four => cells.div_ceil(2),
            BitWidth::Eight => cells,
            BitWidth::Sixteen => cells * 2,
        }
    }

    /// A packed array of `cells` values, all equal to `value`.
    pub fn filled(self, cells: usize, value: u16) -> Vec<u8> {
        match self {
            BitWidth::Four => {
                let nibble = (value & 0x0F) as u8;
                vec![nibble | (nibble << 4); self.byte_len(cells)]
            }
            BitWidth::Eight => vec![value as u8; cells],
            BitWidth::Sixteen => value.to_be_bytes().repeat(cells),
        }
    }

    /// Reads the value at `offset`.
    pub fn read(self, bytes: &[u8], offset: usize) -> u16 {
        match self {
            BitWidth::Four => {
                let byte = bytes[offset >> 1];
                if offset & 1 == 0 {
                    u16::from(byte & 0x0F)
                } else {
                    u16::from(byte >> 4)
                }
            }
            BitWidth::Eight => u16::from(bytes[offset]),
            BitWidth::Sixteen => u16::from_be_bytes([bytes[offset * 2], bytes[offset * 2 + 1]]),
        }
    }

    /// Writes `value` at `offset`. `value` must fit the width.
    pub fn write(self, bytes: &mut [u8], offset: usize, value: u16) {
        debug_assert!(value <= self.max_value(), "value {value} exceeds {}-bit capacity", self.bits());
        match self {
            BitWidth::Four => {
                let byte = &mut bytes[offset >> 1];
                let nibble = (value & 0x0F) as u8;
                if offset & 1 == 0 {
                    *byte = (*byte & 0xF0) | nibble;
                } else {
                    *byte = (*byte & 0x0F) | (nibble << 4);
                }
            }
            BitWidth::Eight => bytes[offset] = value as u8,
            BitWidth::Sixteen => {
                let [hi, lo] = value.to_be_bytes();
                bytes[offset * 2] = hi;
                bytes[offset * 2 + 1] = lo;
            }
        }
    }

    /// Returns the shared value if all `cells` packed values are equal.
    pub fn uniform_value(self, bytes: &[u8], cells: usize) -> Option<u16> {
        if cells == 0 || bytes.len() < self.byte_len(cells) {
            return None;
        }
        let first = self.read(bytes, 0);
        let uniform = match self {
            // A single 4-bit cell leaves the high nibble unused.
            BitWidth::Four if cells == 1 => true,
            BitWidth::Four => {
                let expected = bytes[0];
                (expected >> 4) == (expected & 0x0F) && bytes.iter().all(|&b| b == expected)
            }
            BitWidth::Eight => bytes.iter().all(|&b| b == bytes[0]),
            BitWidth::Sixteen => bytes.chunks_exact(2).all(|pair| pair == &bytes[..2]),
        };
        uniform.then_some(first)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
