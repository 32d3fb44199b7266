use std::path::PathBuf;

use vpdq_lib::{CreationOptions, IndexConfig, MatchConfig};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportVerbosity {
    Quiet,
    Default,
    Verbose,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputFormat {
    Normal,
    Json,
}

/// Where the other side of a comparison comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Video(PathBuf),
    Hashes(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Fingerprint a video. Writes to stdout when there is no output path.
    Hash { video: PathBuf, output: Option<PathBuf> },

    Compare {
        query: PathBuf,
        target: Target,
        by_line: bool,
    },

    Search { query: PathBuf, corpus_dir: PathBuf },
}

/// Whether sources may be hashed, and whether computed fingerprints are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourcePolicy {
    /// If false, the query names a stored fingerprint file rather than a video.
    pub fetch: bool,
    /// Where to write the query fingerprint once it has been computed.
    pub write_back: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OutputCfg {
    pub format: OutputFormat,
    pub verbosity: ReportVerbosity,
}

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub command: Command,

    pub hash_options: CreationOptions,
    pub match_cfg: MatchConfig,
    pub index_cfg: IndexConfig,

    pub source_policy: SourcePolicy,
    /// Accept fingerprints of videos that could not be decoded to the end.
    pub allow_partial: bool,

    pub output_cfg: OutputCfg,
}
