//! Grid ⇄ document mapping.
//!
//! A grid is stored as `{ Shape: {...}, Sections: [ ... ] }` where
//! `Sections` is the trimmed list produced by [`SectionGrid::save`].

use stag_tag::{Compound, Tag};
use stag_voxel::{AttributeSection, GridShape, SectionGrid};

use crate::error::RegionError;

/// Key of the section list.
pub const SECTIONS_KEY: &str = "Sections";

/// Key of the geometry record.
pub const SHAPE_KEY: &str = "Shape";

const GRID_BITS_KEY: &str = "Grid";
const SIZE_BITS_KEY: &str = "Size";
const CHANNEL_BITS_KEY: &str = "Channels";
const CELL_BITS_KEY: &str = "Cells";

/// Builds the stored form of `grid`.
pub fn grid_document<S: AttributeSection>(grid: &SectionGrid<S>) -> Compound {
    Compound::new()
        .with(SHAPE_KEY, shape_document::<S>(grid.shape()))
        .with(SECTIONS_KEY, grid.save())
}

/// Restores `grid` from a document built by [`grid_document`].
///
/// A missing geometry record is accepted; a present one must match.
pub fn load_grid_document<S: AttributeSection>(
    name: &str,
    doc: &Compound,
    grid: &mut SectionGrid<S>,
) -> Result<(), RegionError> {
    let not_a_grid = |reason| RegionError::NotAGrid {
        name: name.to_string(),
        reason,
    };

    if let Some(tag) = doc.get(SHAPE_KEY) {
        let stored = tag.as_compound().ok_or_else(|| not_a_grid("shape is not a structure"))?;
        if *stored != shape_document::<S>(grid.shape()) {
            return Err(RegionError::ShapeMismatch {
                name: name.to_string(),
            });
        }
    }

    let sections = match doc.get(SECTIONS_KEY) {
        Some(Tag::List(sections)) => sections.as_slice(),
        Some(_) => return Err(not_a_grid("sections is not a list")),
        None => return Err(not_a_grid("missing section list")),
    };
    grid.load(sections)?;
    Ok(())
}

fn shape_document<S: AttributeSection>(shape: GridShape) -> Compound {
    let section = shape.section;
    Compound::new()
        .with(
            GRID_BITS_KEY,
            vec![shape.x_section_bits, shape.y_section_bits, shape.z_section_bits],
        )
        .with(SIZE_BITS_KEY, vec![section.x_bits, section.y_bits, section.z_bits])
        .with(CHANNEL_BITS_KEY, section.channel_bits as i8)
        .with(CELL_BITS_KEY, S::WIDTH.bits() as i8)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use stag_voxel::{ByteSection, NibbleSection, SectionShape};

    use super::*;

    fn shape() -> GridShape {
        GridShape::new(0, 2, 0, SectionShape::new(2, 2, 2))
    }

    #[test]
    fn test_document_layout() {
        let grid = SectionGrid::<ByteSection>::new(shape()).unwrap();
        grid.set_data(0, 5, 0, 0, 8).unwrap();
        let doc = grid_document(&grid);

        let sections = doc.get_list(SECTIONS_KEY).unwrap();
        assert_eq!(sections.len(), 2);
        assert!(sections[0].is_empty());
        let shape = doc.get_compound(SHAPE_KEY).unwrap();
        assert_eq!(shape.get_bytes(GRID_BITS_KEY), Some(&[0u8, 2, 0][..]));
        assert_eq!(shape.get_i8(CELL_BITS_KEY), Some(8));
    }

    #[test]
    fn test_load_rejects_other_width() {
        let grid = SectionGrid::<ByteSection>::new(shape()).unwrap();
        let doc = grid_document(&grid);
        let mut nibbles = SectionGrid::<NibbleSection>::new(shape()).unwrap();
        assert!(matches!(
            load_grid_document("g", &doc, &mut nibbles),
            Err(RegionError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_load_without_shape_record() {
        let source = SectionGrid::<ByteSection>::new(shape()).unwrap();
        source.set_data(1, 1, 1, 0, 3).unwrap();
        let mut doc = grid_document(&source);
        doc.remove(SHAPE_KEY);

        let mut target = SectionGrid::<ByteSection>::new(shape()).unwrap();
        load_grid_document("g", &doc, &mut target).unwrap();
        assert_eq!(target.get_data(1, 1, 1, 0).unwrap(), 3);
    }

    #[test]
    fn test_load_requires_section_list() {
        let mut grid = SectionGrid::<ByteSection>::new(shape()).unwrap();
        let doc = Compound::new().with(SECTIONS_KEY, 5i32);
        assert!(matches!(
            load_grid_document("g", &doc, &mut grid),
            Err(RegionError::NotAGrid { .. })
        ));
        assert!(matches!(
            load_grid_document("g", &Compound::new(), &mut grid),
            Err(RegionError::NotAGrid { .. })
        ));
    }
}
