//! Parser and merge configuration.

/// Upper bound for [`PassPolicy::Fixpoint`].
pub const MAX_FIXPOINT_PASSES: usize = 64;

/// Archive entry extensions parsed by default (lowercase, without dot).
pub const DEFAULT_ARCHIVE_EXTENSIONS: &[&str] = &[
    "odx", "odx-d", "odx-c", "odx-cs", "odx-e", "odx-v", "odx-f", "odx-fd", "odx-m", "xml",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Extensions of PDX entries that are parsed as ODX documents.
    pub archive_extensions: Vec<String>,
    /// Maximum nesting of structure expansion below a message parameter.
    pub max_structure_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            archive_extensions: DEFAULT_ARCHIVE_EXTENSIONS
                .iter()
                .map(|e| (*e).to_string())
                .collect(),
            max_structure_depth: 32,
        }
    }
}

impl ParseOptions {
    /// Whether an archive entry name carries an allow-listed extension.
    pub fn accepts_entry(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        lower
            .rsplit_once('.')
            .is_some_and(|(_, ext)| self.archive_extensions.iter().any(|e| e == ext))
    }
}

/// How many inheritance passes the merge engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassPolicy {
    /// Exactly `n` passes.
    Fixed(usize),
    /// Repeat until a pass changes nothing (bounded by
    /// [`MAX_FIXPOINT_PASSES`]).
    #[default]
    Fixpoint,
}

impl std::str::FromStr for PassPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("fixpoint") {
            return Ok(PassPolicy::Fixpoint);
        }
        s.parse::<usize>()
            .map(PassPolicy::Fixed)
            .map_err(|_| format!("invalid pass policy '{s}': use a number or 'fixpoint'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOptions {
    pub passes: PassPolicy,
}
