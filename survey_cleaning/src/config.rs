// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The operating mode of a cleaning run.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RunMode {
    /// Invalid and duplicated rows are dropped from the table. The output
    /// is a cleaned copy of the input.
    Delete,
    /// The table is left untouched. The output is a manifest of row
    /// identities that should be removed, for manual review.
    List,
}

/// The fixed column contract of the survey export format.
///
/// These are format assumptions, not computed properties. The defaults match
/// the known survey tool; generalizing them (for example inferring the number
/// of metadata rows) is out of scope.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CleanRules {
    /// Label of the column holding the respondent token.
    pub token_field: String,
    /// Exact length of a well-formed token. Used by the column repair pass
    /// to recognize tokens written into the overflow column.
    pub token_len: usize,
    /// Number of metadata rows between the header and the first data row.
    /// These rows are carried through to the output but never validated.
    pub meta_rows: usize,
    /// Label of the column whose value identifies a row in list-mode
    /// manifests. Positional indices are not stable across removals, so the
    /// manifest never uses them.
    pub id_field: String,
}

impl Default for CleanRules {
    fn default() -> CleanRules {
        CleanRules {
            token_field: "wca_token".to_string(),
            token_len: 64,
            meta_rows: 1,
            id_field: "Respondent ID".to_string(),
        }
    }
}

// ******** Output data structures *********

/// What the column repair pass did to a table.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct RepairStats {
    /// Rows whose token was recovered from the overflow column.
    pub repaired: usize,
    /// Rows whose overflow cell still holds data after the pass. Non-zero
    /// means the fixed-format assumption may not hold for this file.
    pub leftover: usize,
}

/// Rows discarded (or listed) by one pass.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PassOutcome {
    /// Rows removed from the table. Always zero in list mode.
    pub removed: usize,
    /// Identity values of the non-surviving rows. Always empty in delete
    /// mode. May contain repeats; the pipeline de-duplicates at the end.
    pub identities: Vec<String>,
}

/// The final tally of a full cleaning run over one table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CleanReport {
    /// Data rows processed (table length minus metadata rows, at the start
    /// of the run).
    pub total_responses: usize,
    /// Rows removed (delete mode) or listed for removal (list mode).
    pub removed: usize,
    /// De-duplicated identity manifest, in first-seen order. Empty in
    /// delete mode.
    pub identities: Vec<String>,
}

/// Errors that prevent a cleaning pass from completing.
///
/// Per-row conditions (invalid token, duplicated token) are outcomes, not
/// errors, and never appear here.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CleaningErrors {
    /// The table has no column with the given label.
    MissingColumn(String),
    /// A record does not have one cell per column label.
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl Error for CleaningErrors {}

impl Display for CleaningErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleaningErrors::MissingColumn(label) => {
                write!(f, "table has no column labeled {:?}", label)
            }
            CleaningErrors::RaggedRow {
                row,
                expected,
                found,
            } => write!(f, "row {} has {} cells, expected {}", row, found, expected),
        }
    }
}
