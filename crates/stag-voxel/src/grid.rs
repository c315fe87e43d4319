//! Fixed-size 3-D grid of attribute sections.
//!
//! Sections are stored flat in `(z · Ysz + y) · Xsz + x` order and never
//! resized after construction, so threads working on different sections
//! never contend.

use stag_tag::Compound;

use crate::error::VoxelError;
use crate::section::AttributeSection;
use crate::shape::GridShape;

/// A grid of sections of one variant.
#[derive(Debug)]
pub struct SectionGrid<S: AttributeSection> {
    shape: GridShape,
    sections: Box<[S]>,
}

impl<S: AttributeSection> SectionGrid<S> {
    /// Creates a grid of empty sections.
    pub fn new(shape: GridShape) -> Result<Self, VoxelError> {
        shape.validate()?;
        let sections = (0..shape.section_count())
            .map(|_| S::empty(shape.section))
            .collect::<Result<_, _>>()?;
        Ok(Self { shape, sections })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Section at section coordinate `(x, y, z)`.
    pub fn section(&self, x: usize, y: usize, z: usize) -> Result<&S, VoxelError> {
        let index = self.shape.section_index(x, y, z)?;
        Ok(&self.sections[index])
    }

    pub fn section_mut(&mut self, x: usize, y: usize, z: usize) -> Result<&mut S, VoxelError> {
        let index = self.shape.section_index(x, y, z)?;
        Ok(&mut self.sections[index])
    }

    /// All sections in flat index order.
    pub fn sections(&self) -> &[S] {
        &self.sections
    }

    /// Reads the cell at absolute voxel coordinate `(x, y, z)`.
    pub fn get_data(&self, x: usize, y: usize, z: usize, channel: usize) -> Result<u16, VoxelError> {
        let ([sx, sy, sz], [lx, ly, lz]) = self.shape.split(x, y, z);
        self.section(sx, sy, sz)?.get(lx, ly, lz, channel)
    }

    /// Writes the cell at absolute voxel coordinate `(x, y, z)`.
    pub fn set_data(&self, x: usize, y: usize, z: usize, channel: usize, value: u16) -> Result<(), VoxelError> {
        let ([sx, sy, sz], [lx, ly, lz]) = self.shape.split(x, y, z);
        self.section(sx, sy, sz)?.set(lx, ly, lz, channel, value)
    }

    /// [`set_data`](Self::set_data) without per-section locking.
    pub fn set_data_unsync(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
        channel: usize,
        value: u16,
    ) -> Result<(), VoxelError> {
        let ([sx, sy, sz], [lx, ly, lz]) = self.shape.split(x, y, z);
        self.section_mut(sx, sy, sz)?
            .set_unsync(lx, ly, lz, channel, value)
    }

    /// `true` if every section intersecting the inclusive voxel box
    /// `min..=max` is empty. Corners are clamped to the grid; a box that
    /// misses the grid entirely is empty.
    pub fn is_empty(&self, min: [usize; 3], max: [usize; 3]) -> bool {
        let extent = self.shape.voxel_extent();
        if (0..3).any(|axis| min[axis] > max[axis] || min[axis] >= extent[axis]) {
            return true;
        }
        let max = [
            max[0].min(extent[0] - 1),
            max[1].min(extent[1] - 1),
            max[2].min(extent[2] - 1),
        ];
        let (lo, _) = self.shape.split(min[0], min[1], min[2]);
        let (hi, _) = self.shape.split(max[0], max[1], max[2]);

        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    match self.section(x, y, z) {
                        Ok(section) if !section.is_empty() => return false,
                        _ => {}
                    }
                }
            }
        }
        true
    }

    /// Compresses every section. Returns how many are uniform afterwards.
    pub fn compress_all(&mut self) -> usize {
        let uniform = self
            .sections
            .iter_mut()
            .map(|section| section.compress())
            .filter(|&uniform| uniform)
            .count();
        tracing::debug!(uniform, total = self.sections.len(), "compressed section grid");
        uniform
    }

    /// Serializes the sections in flat order.
    ///
    /// The trailing run of empty sections is dropped; empty sections before
    /// the last non-empty one become empty compounds so positions survive.
    pub fn save(&self) -> Vec<Compound> {
        let docs: Vec<Option<Compound>> = self.sections.iter().map(|s| s.serialize()).collect();
        let kept = docs.iter().rposition(Option::is_some).map_or(0, |last| last + 1);
        docs.into_iter()
            .take(kept)
            .map(Option::unwrap_or_default)
            .collect()
    }

    /// Restores sections from [`save`](Self::save) output.
    ///
    /// Sections past the end of `docs` are reset to empty. Entries past the
    /// grid's section count are ignored. On error the grid is left unchanged.
    pub fn load(&mut self, docs: &[Compound]) -> Result<(), VoxelError> {
        if docs.len() > self.sections.len() {
            tracing::warn!(
                saved = docs.len(),
                capacity = self.sections.len(),
                "ignoring saved sections beyond grid size"
            );
        }
        let mut loaded = Vec::with_capacity(self.sections.len());
        for index in 0..self.sections.len() {
            let mut section = S::empty(self.shape.section)?;
            section.deserialize(docs.get(index))?;
            loaded.push(section);
        }
        self.sections = loaded.into_boxed_slice();
        Ok(())
    }

    /// Resets every section to empty.
    pub fn clear(&mut self) {
        for section in self.sections.iter_mut() {
            section.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
