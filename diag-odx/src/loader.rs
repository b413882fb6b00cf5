//! Document loading: bytes -> XML tree, with encoding fallback.
//!
//! Real-world ODX exports are not always the UTF-8 they claim to be. A
//! document that fails to parse as-is is re-decoded under a fixed ladder of
//! candidate encodings and parsed again with HTML entity names accepted.
//! Only when every candidate fails is the document rejected.

use std::io::Cursor;
use std::path::Path;

use diag_db::Container;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use thiserror::Error;

use crate::options::ParseOptions;
use crate::parser::parse_container;
use crate::pdx_reader::{self, EntryFailure, PdxReadError};
use crate::xml::{self, Element, EntityMode, XmlError};

/// Tag of the nominal document wrapper.
pub const CONTAINER_TAG: &str = "DIAG-LAYER-CONTAINER";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no '<' found, input is not an XML document")]
    NoRoot,
    #[error("XML is ill-formed under every candidate encoding: {0}")]
    Malformed(#[source] XmlError),
    #[error("PDX archive error: {0}")]
    Archive(#[from] PdxReadError),
}

/// Candidate interpretations of a document's bytes, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Utf8,
    /// UTF-16 with byte order taken from the BOM, little endian without one.
    Utf16,
    Utf16Le,
    Utf16Be,
    Windows1252,
    Latin1,
}

pub const FALLBACK_LADDER: [Fallback; 6] = [
    Fallback::Utf8,
    Fallback::Utf16,
    Fallback::Utf16Le,
    Fallback::Utf16Be,
    Fallback::Windows1252,
    Fallback::Latin1,
];

impl Fallback {
    pub fn label(self) -> &'static str {
        match self {
            Fallback::Utf8 => "utf-8",
            Fallback::Utf16 => "utf-16",
            Fallback::Utf16Le => "utf-16le",
            Fallback::Utf16Be => "utf-16be",
            Fallback::Windows1252 => "cp1252",
            Fallback::Latin1 => "latin-1",
        }
    }

    /// Decode `bytes`, or `None` if they are malformed in this encoding.
    /// Latin-1 maps every byte and never fails. UTF-8 input with a few stray
    /// bytes is still taken as UTF-8 when it holds at least one well-formed
    /// multi-byte sequence; the stray bytes become U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        let strict = |enc: &'static Encoding, b: &[u8]| {
            enc.decode_without_bom_handling_and_without_replacement(b)
                .map(|s| s.into_owned())
        };
        match self {
            Fallback::Utf8 => strict(UTF_8, bytes).or_else(|| {
                mostly_utf8(bytes).then(|| UTF_8.decode_without_bom_handling(bytes).0.into_owned())
            }),
            Fallback::Utf16 => match Encoding::for_bom(bytes) {
                Some((enc, bom_len)) if enc == UTF_16LE || enc == UTF_16BE => {
                    strict(enc, &bytes[bom_len..])
                }
                _ => strict(UTF_16LE, bytes),
            },
            Fallback::Utf16Le => strict(UTF_16LE, bytes),
            Fallback::Utf16Be => strict(UTF_16BE, bytes),
            Fallback::Windows1252 => strict(WINDOWS_1252, bytes),
            Fallback::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// True if `bytes` carry at least one valid non-ASCII UTF-8 sequence.
fn mostly_utf8(bytes: &[u8]) -> bool {
    bytes.utf8_chunks().any(|chunk| !chunk.valid().is_ascii())
}

/// Parse a document's bytes into an XML tree.
pub fn parse_document(bytes: &[u8]) -> Result<Element, LoadError> {
    // Anything before the first '<' (BOMs, editor junk) is discarded
    let start = bytes
        .iter()
        .position(|&b| b == b'<')
        .ok_or(LoadError::NoRoot)?;
    let anchored = &bytes[start..];

    let mut last_err = match std::str::from_utf8(anchored) {
        Ok(text) => match xml::parse_str(text, EntityMode::Strict) {
            Ok(root) => return Ok(root),
            Err(e) => e,
        },
        Err(e) => XmlError::Utf8(e),
    };
    log::debug!("strict parse failed ({}), trying encoding fallbacks", last_err);

    for fallback in FALLBACK_LADDER {
        let Some(decoded) = fallback.decode(bytes) else {
            log::debug!("input is not valid {}", fallback.label());
            continue;
        };
        let Some(pos) = decoded.find('<') else {
            continue;
        };
        match xml::parse_str(&decoded[pos..], EntityMode::Html) {
            Ok(root) => {
                log::info!("recovered document using {} fallback", fallback.label());
                return Ok(root);
            }
            Err(e) => last_err = e,
        }
    }

    Err(LoadError::Malformed(last_err))
}

/// The diagnostic layer container of a document: the root itself, a direct
/// child, any descendant, or failing all of those the root unchanged.
pub fn ensure_container(root: &Element) -> &Element {
    if root.is(CONTAINER_TAG) {
        return root;
    }
    root.child(CONTAINER_TAG)
        .or_else(|| root.descendants(CONTAINER_TAG).into_iter().next())
        .unwrap_or(root)
}

/// Containers parsed from one input, plus the archive entries that failed.
#[derive(Debug, Default)]
pub struct LoadedInput {
    pub name: String,
    pub containers: Vec<Container>,
    pub failures: Vec<EntryFailure>,
}

/// Load one input: a PDX archive (detected by magic bytes) or a single ODX
/// document.
pub fn load_input(
    name: &str,
    bytes: &[u8],
    options: &ParseOptions,
) -> Result<LoadedInput, LoadError> {
    if pdx_reader::is_archive(bytes) {
        let contents = pdx_reader::read_pdx_from_reader(Cursor::new(bytes), options)?;
        return Ok(LoadedInput {
            name: name.to_string(),
            containers: contents.containers,
            failures: contents.failures,
        });
    }

    let root = parse_document(bytes)?;
    let container = parse_container(&root, options);
    log::info!(
        "parsed '{}': {} layer(s)",
        name,
        container.layer_count()
    );
    Ok(LoadedInput {
        name: name.to_string(),
        containers: vec![container],
        failures: Vec::new(),
    })
}

pub fn load_file(path: &Path, options: &ParseOptions) -> Result<LoadedInput, LoadError> {
    let bytes = std::fs::read(path)?;
    load_input(&path.display().to_string(), &bytes, options)
}
