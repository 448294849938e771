use clap::Parser;

/// This is a survey-response cleaning program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, repeatable) A CSV file with the survey responses. Each file is
    /// processed independently: duplicates are only detected within a single file.
    #[clap(short, long, value_parser, required = true)]
    pub input: Vec<String>,

    /// (file path) The file with the authoritative list of respondent tokens,
    /// one token per line.
    #[clap(short, long, value_parser)]
    pub tokens: String,

    /// (default delete) 'delete' writes a cleaned copy of each input with invalid
    /// and duplicated responses removed. 'list' leaves the inputs untouched and
    /// writes a manifest of response identities to remove.
    #[clap(short, long, value_parser)]
    pub mode: Option<String>,

    /// (directory path, default 'Validated') The directory where cleaned tables
    /// and manifests are written. It is created if it does not exist.
    #[clap(short, long, value_parser)]
    pub out_dir: Option<String>,

    /// (file path or 'stdout') If specified, a summary of the runs will be written
    /// in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub summary: Option<String>,

    /// If passed as an argument, the repair, duplicate and validation passes run
    /// normally but no output file is written.
    #[clap(long, takes_value = false)]
    pub dry_run: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
