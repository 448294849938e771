mod config;
use log::{debug, info, warn};

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

pub use crate::config::*;

// **** Data model ****

/// A stable row identifier, assigned once at load time.
///
/// Removals never shift identifiers, so a `RowId` collected before a removal
/// pass is still valid afterwards.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct RowId(pub u32);

/// One response row: the original-order identifier plus one text cell per
/// table column. Cells are never coerced to numbers.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Row {
    id: RowId,
    cells: Vec<String>,
    removed: bool,
}

impl Row {
    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn get(&self, col: usize) -> Option<&str> {
        self.cells.get(col).map(|s| s.as_str())
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

/// An in-memory survey-response table.
///
/// Rows keep their original order for the whole run; cleaning passes only
/// mark rows as removed and compact, they never reorder or insert.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Builds a table from a header and the records below it. Every record
    /// must have exactly one cell per column label.
    pub fn from_records(
        columns: Vec<String>,
        records: Vec<Vec<String>>,
    ) -> Result<Table, CleaningErrors> {
        let mut rows: Vec<Row> = Vec::with_capacity(records.len());
        for (idx, cells) in records.into_iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(CleaningErrors::RaggedRow {
                    row: idx,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }
            rows.push(Row {
                id: RowId(idx as u32),
                cells,
                removed: false,
            });
        }
        Ok(Table { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == label)
    }

    /// The index of the overflow column: the last physical column, unless
    /// that column is the token column itself (in which case the table has
    /// no overflow column).
    pub fn overflow_index(&self, rules: &CleanRules) -> Option<usize> {
        match self.columns.last() {
            Some(label) if self.columns.len() > 1 && *label != rules.token_field => {
                Some(self.columns.len() - 1)
            }
            _ => None,
        }
    }

    /// Number of rows still in the table (header excluded, metadata rows
    /// included).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows.iter()
    }

    /// Drops the last column from the header and from every row.
    pub fn drop_last_column(&mut self) -> Option<String> {
        let label = self.columns.pop()?;
        for row in self.rows.iter_mut() {
            row.cells.pop();
        }
        Some(label)
    }

    fn compact(&mut self) {
        self.rows.retain(|r| !r.removed);
    }

    fn data_rows_mut(&mut self, meta_rows: usize) -> impl Iterator<Item = &mut Row> + '_ {
        self.rows
            .iter_mut()
            .skip(meta_rows)
            .filter(|r| !r.removed)
    }
}

/// The authoritative set of valid tokens, loaded once per run.
///
/// Membership is case- and whitespace-sensitive. Empty lines of the token
/// file end up as empty-string members; they can never match a response
/// because empty trimmed tokens fail validation before membership is
/// checked.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TokenSet {
    tokens: HashSet<String>,
}

impl TokenSet {
    pub fn from_lines(content: &str) -> TokenSet {
        TokenSet {
            tokens: content.split('\n').map(|s| s.to_string()).collect(),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// **** Cleaning passes ****

/// Recovers tokens that the survey tool wrote into the overflow column.
///
/// For every data row whose token field is blank, if the trimmed overflow
/// cell has exactly the expected token length, the value is moved (trimmed)
/// into the token field and the overflow cell is cleared. Must run before
/// duplicate resolution and validation, since both key on the token field.
/// Running the pass twice is equivalent to running it once.
pub fn repair_token_positions(
    table: &mut Table,
    rules: &CleanRules,
) -> Result<RepairStats, CleaningErrors> {
    let token_idx = table
        .column_index(&rules.token_field)
        .ok_or_else(|| CleaningErrors::MissingColumn(rules.token_field.clone()))?;
    let overflow_idx = match table.overflow_index(rules) {
        Some(idx) => idx,
        None => {
            debug!("repair_token_positions: no overflow column, skipping");
            return Ok(RepairStats {
                repaired: 0,
                leftover: 0,
            });
        }
    };

    let mut repaired = 0usize;
    let mut leftover = 0usize;
    for row in table.data_rows_mut(rules.meta_rows) {
        if row.cells[token_idx].trim().is_empty() {
            let candidate = row.cells[overflow_idx].trim();
            if candidate.len() == rules.token_len {
                let token = candidate.to_string();
                debug!("#{} >> repaired", row.id.0);
                row.cells[token_idx] = token;
                row.cells[overflow_idx].clear();
                repaired += 1;
                continue;
            }
        }
        if !row.cells[overflow_idx].trim().is_empty() {
            leftover += 1;
        }
    }
    Ok(RepairStats { repaired, leftover })
}

/// Enforces at most one surviving row per non-empty token, keeping the first
/// occurrence in original order.
///
/// Single pass over the table with a token to first-seen map. Rows with an
/// empty trimmed token never join a duplicate group; the validation pass
/// handles them.
pub fn resolve_duplicates(
    table: &mut Table,
    rules: &CleanRules,
    mode: RunMode,
) -> Result<PassOutcome, CleaningErrors> {
    let token_idx = table
        .column_index(&rules.token_field)
        .ok_or_else(|| CleaningErrors::MissingColumn(rules.token_field.clone()))?;
    let id_idx = match mode {
        RunMode::List => Some(
            table
                .column_index(&rules.id_field)
                .ok_or_else(|| CleaningErrors::MissingColumn(rules.id_field.clone()))?,
        ),
        RunMode::Delete => None,
    };

    let mut first_seen: HashMap<String, RowId> = HashMap::new();
    let mut outcome = PassOutcome::default();
    for row in table.data_rows_mut(rules.meta_rows) {
        let token = row.cells[token_idx].trim().to_string();
        if token.is_empty() {
            continue;
        }
        match first_seen.entry(token) {
            Entry::Vacant(e) => {
                e.insert(row.id);
            }
            Entry::Occupied(e) => {
                info!(
                    "#{} >> token already seen at #{}",
                    row.id.0,
                    e.get().0
                );
                match id_idx {
                    None => {
                        row.removed = true;
                        outcome.removed += 1;
                    }
                    Some(idx) => outcome.identities.push(row.cells[idx].clone()),
                }
            }
        }
    }
    if mode == RunMode::Delete {
        table.compact();
    }
    Ok(outcome)
}

/// Row-by-row token check against the token set.
///
/// Runs strictly after duplicate resolution: rows the resolver removed are
/// never revisited, so a row that is both duplicated and invalid is counted
/// once. A row fails when its trimmed token is empty or unknown.
pub fn validate_tokens(
    table: &mut Table,
    tokens: &TokenSet,
    rules: &CleanRules,
    mode: RunMode,
) -> Result<PassOutcome, CleaningErrors> {
    let token_idx = table
        .column_index(&rules.token_field)
        .ok_or_else(|| CleaningErrors::MissingColumn(rules.token_field.clone()))?;
    let id_idx = match mode {
        RunMode::List => Some(
            table
                .column_index(&rules.id_field)
                .ok_or_else(|| CleaningErrors::MissingColumn(rules.id_field.clone()))?,
        ),
        RunMode::Delete => None,
    };

    let mut outcome = PassOutcome::default();
    for row in table.data_rows_mut(rules.meta_rows) {
        let token = row.cells[token_idx].trim();
        if token.is_empty() || !tokens.contains(token) {
            if !token.is_empty() {
                info!("#{} >> invalid token", row.id.0);
            }
            match id_idx {
                None => {
                    debug!("#{} >> deleted", row.id.0);
                    row.removed = true;
                    outcome.removed += 1;
                }
                Some(idx) => outcome.identities.push(row.cells[idx].clone()),
            }
            continue;
        }
        debug!("#{} >> OK", row.id.0);
    }
    if mode == RunMode::Delete {
        table.compact();
    }
    Ok(outcome)
}

/// Runs the full cleaning pipeline on one table: column repair, duplicate
/// resolution, then validation.
///
/// Arguments:
/// * `table` the parsed survey-response table, mutated in place in delete
///   mode and left untouched in list mode
/// * `tokens` the authoritative token set for this run
/// * `rules` the column contract of the export format
/// * `mode` delete or list
pub fn run_cleaning(
    table: &mut Table,
    tokens: &TokenSet,
    rules: &CleanRules,
    mode: RunMode,
) -> Result<CleanReport, CleaningErrors> {
    let total_responses = table.len().saturating_sub(rules.meta_rows);
    info!(
        "Processing {} responses against {} tokens",
        total_responses,
        tokens.len()
    );

    info!("Fixing columns...");
    let repair = repair_token_positions(table, rules)?;
    if repair.repaired > 0 {
        info!("Recovered {} misplaced tokens.", repair.repaired);
    }
    if repair.leftover > 0 {
        warn!(
            "Overflow column still holds data in {} rows. Continuing anyway.",
            repair.leftover
        );
    }

    info!("Checking responses with duplicated tokens...");
    let duplicates = resolve_duplicates(table, rules, mode)?;
    match mode {
        RunMode::Delete => info!("Removed {} duplicates.", duplicates.removed),
        RunMode::List => info!("Found {} duplicates.", duplicates.identities.len()),
    }

    info!("Validating responses...");
    let invalid = validate_tokens(table, tokens, rules, mode)?;

    // An identity can be reported by both passes in list mode. Keep the
    // first occurrence only.
    let mut seen: HashSet<String> = HashSet::new();
    let mut identities: Vec<String> = Vec::new();
    for id in duplicates
        .identities
        .into_iter()
        .chain(invalid.identities.into_iter())
    {
        if seen.insert(id.clone()) {
            identities.push(id);
        }
    }

    let removed = match mode {
        RunMode::Delete => duplicates.removed + invalid.removed,
        RunMode::List => identities.len(),
    };
    Ok(CleanReport {
        total_responses,
        removed,
        identities,
    })
}
