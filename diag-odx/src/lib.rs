pub mod identity;
pub mod inheritance;
pub mod layer;
pub mod loader;
pub mod options;
pub mod param;
pub mod parser;
pub mod pdx_reader;
pub mod ref_resolver;
pub mod service;
pub mod tables;
pub mod xml;

pub use inheritance::merge_containers;
pub use loader::{load_file, load_input, LoadError, LoadedInput};
pub use options::{MergeOptions, ParseOptions, PassPolicy};
pub use param::ParamError;
pub use parser::{parse_container, parse_odx};
pub use pdx_reader::{read_pdx_file, read_pdx_from_reader, ArchiveContents, EntryFailure, PdxReadError};
