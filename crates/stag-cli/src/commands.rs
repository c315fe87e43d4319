//! Subcommand implementations. Output goes to the supplied writer.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

use stag_config::Config;
use stag_region::{RegionError, RegionStore, grid_shape, load_grid_document};
use stag_tag::archive::read_header;
use stag_tag::{ArchiveError, EncodeOptions, TagArchive, decode, encode};
use stag_voxel::{AttributeSection, ByteSection, NibbleSection, SectionGrid, ShortSection};

/// Errors reported by a subcommand.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("no entry named {0}")]
    MissingEntry(String),

    #[error("unsupported cell width {0}")]
    CellBits(u8),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Prints every entry name with its payload size, reading only the header.
pub fn list(archive: &Path, out: &mut impl Write) -> Result<(), CommandError> {
    let mut source = BufReader::new(File::open(archive)?);
    let header = read_header(&mut source)?;
    let mut total = 0u64;
    for entry in &header {
        writeln!(out, "{:>10}  {}", entry.len, entry.name)?;
        total += u64::from(entry.len);
    }
    writeln!(out, "{} entries, {} payload bytes", header.len(), total)?;
    Ok(())
}

/// Prints one decoded entry.
pub fn dump(archive: &Path, entry: &str, out: &mut impl Write) -> Result<(), CommandError> {
    let doc = RegionStore::read_document_at(archive, entry)?
        .ok_or_else(|| CommandError::MissingEntry(entry.to_string()))?;
    writeln!(out, "{doc}")?;
    Ok(())
}

/// Counts of re-encoded and verbatim-copied entries.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepackSummary {
    pub reencoded: usize,
    pub copied: usize,
}

/// Re-encodes every decodable entry of `input` with `options` into `output`.
/// Entries that do not decode are copied unchanged.
pub fn repack(input: &Path, output: &Path, options: EncodeOptions) -> Result<RepackSummary, CommandError> {
    let source = TagArchive::read_all(BufReader::new(File::open(input)?))?;
    let mut target = TagArchive::new();
    let mut summary = RepackSummary::default();

    for (name, payload) in source.iter() {
        match decode(payload) {
            Ok(doc) => {
                target.put(name, encode(&doc, options).map_err(RegionError::from)?);
                summary.reencoded += 1;
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "entry does not decode, copying verbatim");
                target.put(name, payload.to_vec());
                summary.copied += 1;
            }
        }
    }

    RegionStore::with_archive(target, options).write_to_path(output)?;
    tracing::info!(
        reencoded = summary.reencoded,
        copied = summary.copied,
        "repacked {} into {}",
        input.display(),
        output.display()
    );
    Ok(summary)
}

/// Loads one grid entry with the configured geometry and prints the state of
/// every section.
pub fn grid(archive: &Path, entry: &str, config: &Config, out: &mut impl Write) -> Result<(), CommandError> {
    match config.grid.cell_bits {
        4 => print_grid::<NibbleSection>(archive, entry, config, out),
        8 => print_grid::<ByteSection>(archive, entry, config, out),
        16 => print_grid::<ShortSection>(archive, entry, config, out),
        other => Err(CommandError::CellBits(other)),
    }
}

fn print_grid<S: AttributeSection>(
    archive: &Path,
    entry: &str,
    config: &Config,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let shape = grid_shape(&config.grid)?;
    let doc = RegionStore::read_document_at(archive, entry)?
        .ok_or_else(|| CommandError::MissingEntry(entry.to_string()))?;
    let mut grid = SectionGrid::<S>::new(shape).map_err(RegionError::from)?;
    load_grid_document(entry, &doc, &mut grid)?;

    let mut materialized = 0;
    for z in 0..shape.sections_z() {
        for y in 0..shape.sections_y() {
            for x in 0..shape.sections_x() {
                let section = grid.section(x, y, z).map_err(RegionError::from)?;
                if section.is_empty() {
                    continue;
                }
                if section.is_uniform() {
                    writeln!(out, "({x}, {y}, {z})  uniform {}", section.default_value())?;
                } else {
                    writeln!(out, "({x}, {y}, {z})  materialized")?;
                    materialized += 1;
                }
            }
        }
    }
    writeln!(
        out,
        "{} sections, {} materialized",
        shape.section_count(),
        materialized
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use stag_tag::Compound;

    use super::*;

    fn write_region(path: &Path) {
        let mut store = RegionStore::new(EncodeOptions::plain());
        store
            .put_document("meta", &Compound::new().with("Name", "north").with("Seed", 7i64))
            .unwrap();
        let mut archive = store.into_archive();
        archive.put("raw", vec![1, 2, 3]);
        RegionStore::with_archive(archive, EncodeOptions::plain())
            .write_to_path(path)
            .unwrap();
    }

    #[test]
    fn test_list_prints_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.star");
        write_region(&path);

        let mut out = Vec::new();
        list(&path, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("meta"));
        assert!(text.contains("         3  raw"));
        assert!(text.contains("2 entries"));
    }

    #[test]
    fn test_dump_and_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.star");
        write_region(&path);

        let mut out = Vec::new();
        dump(&path, "meta", &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("north"));

        assert!(matches!(
            dump(&path, "nope", &mut Vec::new()),
            Err(CommandError::MissingEntry(_))
        ));
    }

    #[test]
    fn test_repack_keeps_undecodable_entries() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.star");
        let output = dir.path().join("out.star");
        write_region(&input);

        let options = EncodeOptions::default().with_compression(Some(9));
        let summary = repack(&input, &output, options).unwrap();
        assert_eq!(
            summary,
            RepackSummary {
                reencoded: 1,
                copied: 1
            }
        );

        let store = RegionStore::open_path(&output, options).unwrap();
        assert_eq!(store.archive().get("raw"), Some(&[1u8, 2, 3][..]));
        let meta = store.get_document("meta").unwrap().unwrap();
        assert_eq!(meta.get_i64("Seed"), Some(7));
    }

    #[test]
    fn test_grid_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.star");
        let config = Config::default();

        let mut grid = SectionGrid::<ByteSection>::new(grid_shape(&config.grid).unwrap()).unwrap();
        grid.set_data(0, 20, 0, 0, 3).unwrap();
        let mut store = RegionStore::from_config(&config).unwrap();
        store.save_grid("blocks", &mut grid).unwrap();
        store.write_to_path(&path).unwrap();

        let mut out = Vec::new();
        super::grid(&path, "blocks", &config, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(0, 1, 0)  materialized"));
        assert!(text.contains("16 sections, 1 materialized"));
    }
}
