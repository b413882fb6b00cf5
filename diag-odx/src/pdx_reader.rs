use crate::loader::{LoadError, parse_document};
use crate::options::ParseOptions;
use crate::parser::parse_container;
use diag_db::Container;
use std::io::Read;
use std::path::Path;

/// Local file header signature of a zip archive.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Errors that make a whole PDX file unreadable.
#[derive(Debug, thiserror::Error)]
pub enum PdxReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// An archive entry that could not be read or parsed.
#[derive(Debug, thiserror::Error)]
#[error("entry '{name}': {error}")]
pub struct EntryFailure {
    pub name: String,
    #[source]
    pub error: LoadError,
}

#[derive(Debug, Default)]
pub struct ArchiveContents {
    /// One container per entry that held at least one layer, in archive order.
    pub containers: Vec<Container>,
    pub parsed_entries: usize,
    pub failures: Vec<EntryFailure>,
}

pub fn is_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Read a PDX file (ZIP archive containing ODX files).
pub fn read_pdx_file(path: &Path, options: &ParseOptions) -> Result<ArchiveContents, PdxReadError> {
    let file = std::fs::File::open(path)?;
    read_pdx_from_reader(file, options)
}

/// Read a PDX from any reader (for testing with in-memory data).
///
/// Each allow-listed entry is parsed on its own; an entry that fails is
/// recorded in [`ArchiveContents::failures`] and the rest still load.
pub fn read_pdx_from_reader<R: Read + std::io::Seek>(
    reader: R,
    options: &ParseOptions,
) -> Result<ArchiveContents, PdxReadError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut contents = ArchiveContents::default();

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable PDX entry #{}: {}", i, e);
                contents.failures.push(EntryFailure {
                    name: format!("#{i}"),
                    error: LoadError::Archive(e.into()),
                });
                continue;
            }
        };
        let name = entry.name().to_string();
        if entry.is_dir() || !options.accepts_entry(&name) {
            continue;
        }

        let mut bytes = Vec::new();
        if let Err(e) = entry.read_to_end(&mut bytes) {
            log::warn!("Skipping PDX entry '{}': {}", name, e);
            contents.failures.push(EntryFailure {
                name,
                error: LoadError::Io(e),
            });
            continue;
        }

        log::info!("Parsing ODX from PDX entry: {}", name);
        let root = match parse_document(&bytes) {
            Ok(root) => root,
            Err(error) => {
                log::warn!("Skipping PDX entry '{}': {}", name, error);
                contents.failures.push(EntryFailure { name, error });
                continue;
            }
        };
        contents.parsed_entries += 1;

        let container = parse_container(&root, options);
        if container.is_empty() {
            // Comparam specs, vehicle info and the like carry no layers
            log::debug!("PDX entry '{}' has no diagnostic layers", name);
            continue;
        }
        contents.containers.push(container);
    }

    Ok(contents)
}
