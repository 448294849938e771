use log::{info, warn};

use survey_cleaning::*;
use snafu::{prelude::*, Snafu};

use once_cell::sync::Lazy;
use regex::Regex;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::args::Args;

pub mod io_csv;

#[derive(Debug, Snafu)]
pub enum CleanError {
    #[snafu(display("Input file not found or unreadable: {path}"))]
    InputNotFound { source: csv::Error, path: String },
    #[snafu(display("Token file not found or unreadable: {path}"))]
    TokensNotFound {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Input file {path} has no header row"))]
    EmptyInput { path: String },
    #[snafu(display("Could not parse line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("{source}"))]
    Cleaning { source: CleaningErrors },
    #[snafu(display("Could not write output file {path}"))]
    OutputCsv { source: csv::Error, path: String },
    #[snafu(display("Could not write {path}"))]
    OutputIo {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Could not serialize the run summary"))]
    SummaryJson { source: serde_json::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CleanResult<T> = Result<T, CleanError>;

/// One entry of the JSON run summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: String,
    pub mode: String,
    #[serde(rename = "totalResponses")]
    pub total_responses: usize,
    pub removed: usize,
}

/// Runs the cleaning pipeline over every input file, sequentially. Each file
/// gets its own table and token set; duplicate detection never crosses file
/// boundaries.
pub fn run(args: &Args) -> CleanResult<()> {
    let mode = parse_mode(&args.mode)?;
    let rules = CleanRules::default();
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| "Validated".to_string());
    if !args.dry_run {
        fs::create_dir_all(&out_dir).context(OutputIoSnafu {
            path: out_dir.clone(),
        })?;
    }

    let mut summaries: Vec<FileSummary> = Vec::new();
    for input in args.input.iter() {
        info!("Validating {}...", input);
        let report = run_file(input, &args.tokens, mode, args.dry_run, &out_dir, &rules)?;
        info!(
            "Deleted {} out of {} responses.",
            report.removed, report.total_responses
        );
        summaries.push(FileSummary {
            file: input.clone(),
            mode: mode_label(mode).to_string(),
            total_responses: report.total_responses,
            removed: report.removed,
        });
    }

    if let Some(dest) = &args.summary {
        write_summary(dest, &summaries)?;
    }
    Ok(())
}

/// Cleans a single input file. Returns the report for caller-side counts.
///
/// Nothing is written until the whole pipeline has completed, so a failure
/// mid-validation cannot leave a half-written output behind.
pub fn run_file(
    input: &str,
    tokens_path: &str,
    mode: RunMode,
    dry_run: bool,
    out_dir: &str,
    rules: &CleanRules,
) -> CleanResult<CleanReport> {
    let mut table = io_csv::read_table(input)?;
    let tokens = load_token_set(tokens_path)?;

    let report = run_cleaning(&mut table, &tokens, rules, mode).context(CleaningSnafu)?;

    if dry_run {
        info!("Dry run: no output written.");
        return Ok(report);
    }

    match mode {
        RunMode::Delete => {
            let out_path = output_path(out_dir, "Validated_", input, "");
            write_clean_table(&mut table, rules, &out_path)?;
            info!("File saved as {}.", out_path);
        }
        RunMode::List => {
            let out_path = output_path(out_dir, "Delete_", input, ".txt");
            write_manifest(&report.identities, &out_path)?;
            info!("File saved as {}.", out_path);
        }
    }
    Ok(report)
}

fn parse_mode(mode: &Option<String>) -> CleanResult<RunMode> {
    match mode.as_deref() {
        None | Some("delete") => Ok(RunMode::Delete),
        Some("list") => Ok(RunMode::List),
        Some(x) => whatever!("Unknown mode {:?} (expected 'delete' or 'list')", x),
    }
}

fn mode_label(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Delete => "delete",
        RunMode::List => "list",
    }
}

fn load_token_set(path: &str) -> CleanResult<TokenSet> {
    let content = fs::read_to_string(path).context(TokensNotFoundSnafu { path })?;
    Ok(TokenSet::from_lines(&content))
}

/// Drops the overflow column and serializes the surviving rows, then cleans
/// the placeholder labels out of the written header.
fn write_clean_table(table: &mut Table, rules: &CleanRules, path: &str) -> CleanResult<()> {
    if let Some(overflow_idx) = table.overflow_index(rules) {
        let has_data = table
            .rows()
            .any(|r| !r.get(overflow_idx).unwrap_or("").trim().is_empty());
        if has_data {
            warn!("Overflow column is not empty. Dropping anyway...");
        }
        table.drop_last_column();
    }
    io_csv::write_table(table, path)?;

    info!("Fixing headers...");
    fix_headers(path)
}

// The upstream exporter goes through pandas, which labels blank header
// cells "Unnamed: <column number>".
static UNNAMED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Unnamed: [0-9]+").expect("hardcoded pattern"));

/// Strips every `Unnamed: <digits>` placeholder from the header line of an
/// already-written CSV file. This has to run on the literal file text: the
/// placeholders are column labels, and the in-memory table carries them
/// verbatim.
fn fix_headers(path: &str) -> CleanResult<()> {
    let content = fs::read_to_string(path).context(OutputIoSnafu { path })?;
    let fixed = match content.split_once('\n') {
        Some((header, rest)) => {
            format!("{}\n{}", UNNAMED_PATTERN.replace_all(header, ""), rest)
        }
        None => UNNAMED_PATTERN.replace_all(&content, "").to_string(),
    };
    fs::write(path, fixed).context(OutputIoSnafu { path })
}

fn write_manifest(identities: &[String], path: &str) -> CleanResult<()> {
    let content: String = identities.iter().map(|id| format!("{}\n", id)).collect();
    fs::write(path, content).context(OutputIoSnafu { path })
}

fn write_summary(dest: &str, summaries: &[FileSummary]) -> CleanResult<()> {
    let js = json!({ "runs": summaries });
    let pretty = serde_json::to_string_pretty(&js).context(SummaryJsonSnafu {})?;
    if dest == "stdout" {
        println!("{}", pretty);
    } else {
        fs::write(dest, pretty).context(OutputIoSnafu { path: dest })?;
    }
    Ok(())
}

fn output_path(out_dir: &str, prefix: &str, input: &str, suffix: &str) -> String {
    format!(
        "{}/{}{}{}",
        out_dir,
        prefix,
        simplify_file_name(input),
        suffix
    )
}

fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // 64 characters each, matching the default token length.
    const TOKEN_A: &str = "aaaabbbbccccddddeeeeffffgggghhhhaaaabbbbccccddddeeeeffffgggghhhh";
    const TOKEN_B: &str = "1111222233334444555566667777888811112222333344445555666677778888";

    fn write_fixture(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn standard_input(dir: &Path) -> (String, String) {
        let input = write_fixture(
            dir,
            "survey.csv",
            &format!(
                "Respondent ID,Start Date,Unnamed: 2,wca_token,Unnamed: 4\n\
                 Open-Ended Response,,,,\n\
                 10,1/2/2023,yes,{TOKEN_A},\n\
                 11,1/3/2023,no,{TOKEN_A},\n\
                 12,1/4/2023,yes,,{TOKEN_B}\n\
                 13,1/5/2023,no,bogus,\n"
            ),
        );
        let tokens = write_fixture(dir, "tokens.txt", &format!("{TOKEN_A}\n{TOKEN_B}\n"));
        (input, tokens)
    }

    #[test]
    fn end_to_end_delete_mode() {
        let dir = tempfile::tempdir().unwrap();
        let (input, tokens) = standard_input(dir.path());
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&out_dir).unwrap();
        let out_dir = out_dir.to_str().unwrap();

        let report = run_file(
            &input,
            &tokens,
            RunMode::Delete,
            false,
            out_dir,
            &CleanRules::default(),
        )
        .unwrap();
        assert_eq!(report.total_responses, 4);
        assert_eq!(report.removed, 2);
        assert!(report.identities.is_empty());

        let written = fs::read_to_string(format!("{}/Validated_survey.csv", out_dir)).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        // Overflow column dropped, remaining placeholder blanked.
        assert_eq!(lines[0], "Respondent ID,Start Date,,wca_token");
        assert_eq!(lines[1], "Open-Ended Response,,,");
        assert_eq!(lines[2], format!("10,1/2/2023,yes,{TOKEN_A}"));
        // The misplaced token was recovered before validation.
        assert_eq!(lines[3], format!("12,1/4/2023,yes,{TOKEN_B}"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn end_to_end_list_mode() {
        let dir = tempfile::tempdir().unwrap();
        let (input, tokens) = standard_input(dir.path());
        let before = fs::read_to_string(&input).unwrap();
        let out_dir = dir.path().to_str().unwrap();

        let report = run_file(
            &input,
            &tokens,
            RunMode::List,
            false,
            out_dir,
            &CleanRules::default(),
        )
        .unwrap();
        assert_eq!(report.removed, 2);

        let manifest = fs::read_to_string(format!("{}/Delete_survey.csv.txt", out_dir)).unwrap();
        assert_eq!(manifest, "11\n13\n");
        // List mode never touches the input table.
        assert_eq!(fs::read_to_string(&input).unwrap(), before);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (input, tokens) = standard_input(dir.path());
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&out_dir).unwrap();

        let report = run_file(
            &input,
            &tokens,
            RunMode::Delete,
            true,
            out_dir.to_str().unwrap(),
            &CleanRules::default(),
        )
        .unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let tokens = write_fixture(dir.path(), "tokens.txt", "x\n");
        let res = run_file(
            "does-not-exist.csv",
            &tokens,
            RunMode::Delete,
            false,
            dir.path().to_str().unwrap(),
            &CleanRules::default(),
        );
        assert!(matches!(res, Err(CleanError::InputNotFound { .. })));
    }

    #[test]
    fn missing_token_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (input, _) = standard_input(dir.path());
        let res = run_file(
            &input,
            "does-not-exist.txt",
            RunMode::Delete,
            false,
            dir.path().to_str().unwrap(),
            &CleanRules::default(),
        );
        assert!(matches!(res, Err(CleanError::TokensNotFound { .. })));
    }

    #[test]
    fn fix_headers_strips_placeholders_and_nothing_else() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "out.csv", "col,Unnamed: 3,val\na,b,c\n");
        fix_headers(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "col,,val\na,b,c\n");
    }

    #[test]
    fn fix_headers_leaves_data_rows_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            "out.csv",
            "col,Unnamed: 3\nUnnamed: 4,value\n",
        );
        fix_headers(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "col,\nUnnamed: 4,value\n"
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let res = parse_mode(&Some("purge".to_string()));
        assert!(matches!(res, Err(CleanError::Whatever { .. })));
    }
}
