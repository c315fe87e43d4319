//! Region files: named documents and grids in one STAR archive.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use stag_config::{Config, GridConfig, StorageConfig};
use stag_tag::{Compound, EncodeOptions, TagArchive, decode, encode};
use stag_voxel::{AttributeSection, GridShape, SectionGrid, SectionShape};

use crate::error::RegionError;
use crate::grid_doc::{grid_document, load_grid_document};

/// Encode options described by the storage config.
pub fn encode_options(storage: &StorageConfig) -> EncodeOptions {
    EncodeOptions::default()
        .with_compression(storage.compression_level)
        .with_dictionary(storage.use_dictionary)
}

/// Validated grid geometry described by the grid config.
pub fn grid_shape(grid: &GridConfig) -> Result<GridShape, RegionError> {
    let [sx, sy, sz] = grid.section_bits;
    let [x, y, z] = grid.size_bits;
    let shape = GridShape::new(
        sx,
        sy,
        sz,
        SectionShape::new(x, y, z).with_channel_bits(grid.channel_bits),
    );
    shape.validate()?;
    Ok(shape)
}

/// An in-memory region: an archive of encoded documents plus the options
/// used to encode new entries.
#[derive(Clone, Debug, Default)]
pub struct RegionStore {
    archive: TagArchive,
    options: EncodeOptions,
}

impl RegionStore {
    pub fn new(options: EncodeOptions) -> Self {
        Self {
            archive: TagArchive::new(),
            options,
        }
    }

    /// Empty region encoding with the config's storage settings.
    pub fn from_config(config: &Config) -> Result<Self, RegionError> {
        config.validate()?;
        Ok(Self::new(encode_options(&config.storage)))
    }

    pub fn with_archive(archive: TagArchive, options: EncodeOptions) -> Self {
        Self { archive, options }
    }

    pub fn archive(&self) -> &TagArchive {
        &self.archive
    }

    pub fn into_archive(self) -> TagArchive {
        self.archive
    }

    pub fn options(&self) -> EncodeOptions {
        self.options
    }

    pub fn set_options(&mut self, options: EncodeOptions) {
        self.options = options;
    }

    /// Encodes `doc` and stores it under `name`, replacing any previous entry.
    pub fn put_document(&mut self, name: &str, doc: &Compound) -> Result<(), RegionError> {
        let bytes = encode(doc, self.options)?;
        tracing::debug!(name, bytes = bytes.len(), "stored region entry");
        self.archive.put(name, bytes);
        Ok(())
    }

    /// Decodes the entry `name`; `Ok(None)` if there is none.
    pub fn get_document(&self, name: &str) -> Result<Option<Compound>, RegionError> {
        match self.archive.get(name) {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.archive.has(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.archive.remove(name).is_some()
    }

    /// Compresses every section of `grid` and stores it under `name`.
    pub fn save_grid<S: AttributeSection>(
        &mut self,
        name: &str,
        grid: &mut SectionGrid<S>,
    ) -> Result<(), RegionError> {
        grid.compress_all();
        self.put_document(name, &grid_document(grid))
    }

    /// Loads the entry `name` into `grid`.
    ///
    /// Returns `Ok(false)` and clears the grid when there is no such entry.
    pub fn load_grid<S: AttributeSection>(
        &self,
        name: &str,
        grid: &mut SectionGrid<S>,
    ) -> Result<bool, RegionError> {
        match self.get_document(name)? {
            Some(doc) => {
                load_grid_document(name, &doc, grid)?;
                Ok(true)
            }
            None => {
                grid.clear();
                Ok(false)
            }
        }
    }

    /// [`load_grid`](Self::load_grid), substituting an empty grid for an
    /// entry that cannot be read. Returns whether stored data was loaded.
    pub fn load_grid_or_empty<S: AttributeSection>(&self, name: &str, grid: &mut SectionGrid<S>) -> bool {
        match self.load_grid(name, grid) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(name, error = %e, "unreadable grid entry, using empty grid");
                grid.clear();
                false
            }
        }
    }

    /// Writes the region to `path` via a temporary file and rename.
    pub fn write_to_path(&self, path: &Path) -> Result<(), RegionError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = tmp_path(path);
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            self.archive.write_all(&mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        tracing::info!(path = %path.display(), entries = self.archive.len(), "wrote region");
        Ok(())
    }

    /// Reads a whole region file.
    pub fn open_path(path: &Path, options: EncodeOptions) -> Result<Self, RegionError> {
        let archive = TagArchive::read_all(BufReader::new(File::open(path)?))?;
        tracing::debug!(path = %path.display(), entries = archive.len(), "opened region");
        Ok(Self::with_archive(archive, options))
    }

    /// Decodes one entry straight from a region file without reading the
    /// other entries.
    pub fn read_document_at(path: &Path, name: &str) -> Result<Option<Compound>, RegionError> {
        let file = BufReader::new(File::open(path)?);
        Ok(TagArchive::extract_document(name, file)?)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use stag_voxel::ByteSection;

    use super::*;

    fn grid_config() -> GridConfig {
        GridConfig {
            section_bits: [0, 2, 0],
            size_bits: [2, 2, 2],
            channel_bits: 0,
            cell_bits: 8,
        }
    }

    #[test]
    fn test_options_from_config() {
        let storage = StorageConfig {
            compression_level: Some(3),
            use_dictionary: false,
        };
        let options = encode_options(&storage);
        assert_eq!(options.compression, Some(3));
        assert!(!options.use_dictionary);
    }

    #[test]
    fn test_grid_shape_from_config() {
        let shape = grid_shape(&grid_config()).unwrap();
        assert_eq!(shape.section_count(), 4);
        assert_eq!(shape.voxel_extent(), [4, 16, 4]);

        let mut oversized = grid_config();
        oversized.size_bits = [10, 10, 10];
        assert!(matches!(grid_shape(&oversized), Err(RegionError::Voxel(_))));
    }

    #[test]
    fn test_document_roundtrip() {
        let mut store = RegionStore::new(EncodeOptions::default().with_compression(Some(6)));
        let doc = Compound::new().with("Seed", 42i64).with("Name", "overworld");
        store.put_document("level", &doc).unwrap();
        assert!(store.has("level"));
        assert_eq!(store.get_document("level").unwrap(), Some(doc));
        assert_eq!(store.get_document("missing").unwrap(), None);
    }

    #[test]
    fn test_missing_grid_clears_target() {
        let store = RegionStore::default();
        let mut grid = SectionGrid::<ByteSection>::new(grid_shape(&grid_config()).unwrap()).unwrap();
        grid.set_data(0, 0, 0, 0, 1).unwrap();
        assert!(!store.load_grid("absent", &mut grid).unwrap());
        assert!(grid.is_empty([0, 0, 0], [3, 15, 3]));
    }

    #[test]
    fn test_corrupt_grid_entry_falls_back_to_empty() {
        let mut store = RegionStore::default();
        store.put_document("meta", &Compound::new().with("Ok", true)).unwrap();
        let mut archive = store.into_archive();
        archive.put("grid", b"STAG\x01\xff\x00\x99".to_vec());
        let store = RegionStore::with_archive(archive, EncodeOptions::default());

        let mut grid = SectionGrid::<ByteSection>::new(grid_shape(&grid_config()).unwrap()).unwrap();
        grid.set_data(1, 1, 1, 0, 5).unwrap();
        assert!(!store.load_grid_or_empty("grid", &mut grid));
        assert!(grid.is_empty([0, 0, 0], [3, 15, 3]));
        assert!(store.get_document("meta").unwrap().is_some());
    }

    #[test]
    fn test_tmp_path() {
        assert_eq!(tmp_path(Path::new("dir/r.0.0.star")), PathBuf::from("dir/r.0.0.star.tmp"));
    }
}
