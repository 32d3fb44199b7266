use std::path::PathBuf;

use clap::{value_parser, ArgAction::*, ArgMatches};
use eyre::WrapErr;
use vpdq_lib::*;

use crate::app::*;

// subcommands
const CMD_HASH: &str = "hash";
const CMD_COMPARE: &str = "compare";
const CMD_SEARCH: &str = "search";

// sources
const VIDEO: &str = "Video";
const QUERY: &str = "Query";
const WITH_VIDEO: &str = "Target video";
const WITH_HASHES: &str = "Target hashes";
const CORPUS_DIR: &str = "Corpus directory";
const OUTPUT_FILE: &str = "Output file";

// source policy
const NO_FETCH: &str = "No fetch";
const WRITE_BACK: &str = "Write back";
const ALLOW_PARTIAL: &str = "Allow partial";

//hashing configuration
const SECONDS_PER_HASH: &str = "Seconds per hash";
const DOWNSAMPLE: &str = "Downsample";
const THREADS: &str = "Threads";
const DECODE_TIMEOUT: &str = "Decode timeout";

//match configuration
const DISTANCE_THRESHOLD: &str = "Distance threshold";
const MIN_QUALITY: &str = "Minimum quality";
const MIN_RUN_LENGTH: &str = "Minimum run length";
const BY_LINE: &str = "By line";
const MIN_SCORE: &str = "Minimum score";
const INDEX_BANDS: &str = "Index bands";

//output settings
const OUTPUT_FORMAT: &str = "Format";

//Verbosity
const VERBOSITY_QUIET: &str = "Quiet";
const VERBOSITY_VERBOSE: &str = "Verbose";

const DISPLAY_ORDERING: [&str; 22] = [
    //
    // sources
    VIDEO,
    QUERY,
    WITH_VIDEO,
    WITH_HASHES,
    CORPUS_DIR,
    OUTPUT_FILE,
    //
    //source policy
    NO_FETCH,
    WRITE_BACK,
    ALLOW_PARTIAL,
    //
    //hashing
    SECONDS_PER_HASH,
    DOWNSAMPLE,
    THREADS,
    DECODE_TIMEOUT,
    //
    //matching
    DISTANCE_THRESHOLD,
    MIN_QUALITY,
    MIN_RUN_LENGTH,
    BY_LINE,
    MIN_SCORE,
    INDEX_BANDS,
    //
    //outputs
    OUTPUT_FORMAT,
    //
    //verbosity
    VERBOSITY_QUIET,
    VERBOSITY_VERBOSE,
];

fn get_ordering(arg_name: &str) -> usize {
    match DISPLAY_ORDERING.iter().position(|x| *x == arg_name) {
        Some(idx) => idx,
        None => {
            panic!("argument not assigned a display order: {arg_name:?}");
        }
    }
}

fn add_hashing_args(mut cmd: clap::Command) -> clap::Command {
    cmd = cmd.arg(
        clap::Arg::new(SECONDS_PER_HASH)
            .long("seconds-per-hash")
            .value_parser(value_parser!(f64))
            .help(format!("Interval between hashed frames, in seconds. 0 hashes every frame [default: {DEFAULT_SECONDS_PER_HASH}]"))
            .display_order(get_ordering(SECONDS_PER_HASH)),
    );

    cmd = cmd.arg(
        clap::Arg::new(DOWNSAMPLE)
            .long("downsample")
            .value_parser(value_parser!(u32))
            .help("Scale frames down so that neither side exceeds this many pixels before hashing. 0 decodes at full resolution [default: 512]")
            .display_order(get_ordering(DOWNSAMPLE)),
    );

    cmd = cmd.arg(
        clap::Arg::new(THREADS)
            .long("threads")
            .value_parser(value_parser!(usize))
            .help("Number of threads used to hash frames [default: number of cpus]")
            .display_order(get_ordering(THREADS)),
    );

    cmd = cmd.arg(
        clap::Arg::new(DECODE_TIMEOUT)
            .long("decode-timeout")
            .value_parser(value_parser!(u64))
            .help("Give up decoding a video after this many seconds")
            .display_order(get_ordering(DECODE_TIMEOUT)),
    );

    cmd = cmd.arg(
        clap::Arg::new(ALLOW_PARTIAL)
            .long("allow-partial")
            .num_args(0)
            .action(SetTrue)
            .help("Accept the fingerprint of a video that could not be decoded to the end, instead of failing")
            .display_order(get_ordering(ALLOW_PARTIAL)),
    );

    cmd
}

fn add_matching_args(mut cmd: clap::Command) -> clap::Command {
    cmd = cmd.arg(
        clap::Arg::new(DISTANCE_THRESHOLD)
            .long("distance-threshold")
            .value_parser(value_parser!(u32))
            .help(format!("Maximum number of differing bits (out of {HASH_BITS}) for two frames to match [default: {DEFAULT_DISTANCE_THRESHOLD}]"))
            .display_order(get_ordering(DISTANCE_THRESHOLD)),
    );

    cmd = cmd.arg(
        clap::Arg::new(MIN_QUALITY)
            .long("min-quality")
            .value_parser(value_parser!(f64))
            .help(format!("Frames with a quality below this (0..=100) are ignored [default: {DEFAULT_MIN_QUALITY}]"))
            .display_order(get_ordering(MIN_QUALITY)),
    );

    cmd = cmd.arg(
        clap::Arg::new(MIN_RUN_LENGTH)
            .long("min-run-length")
            .value_parser(value_parser!(usize))
            .help(format!("Minimum number of consecutive matching frames that counts as a match [default: {DEFAULT_MIN_MATCH_RUN_LENGTH}]"))
            .display_order(get_ordering(MIN_RUN_LENGTH)),
    );

    cmd
}

fn add_query_args(mut cmd: clap::Command) -> clap::Command {
    cmd = cmd.arg(
        clap::Arg::new(QUERY)
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("The query video. With --no-fetch, a fingerprint file of the query video")
            .display_order(get_ordering(QUERY)),
    );

    cmd = cmd.arg(
        clap::Arg::new(NO_FETCH)
            .long("no-fetch")
            .num_args(0)
            .action(SetTrue)
            .help("Do not hash the query video. The query is read from a stored fingerprint file instead")
            .display_order(get_ordering(NO_FETCH)),
    );

    cmd = cmd.arg(
        clap::Arg::new(WRITE_BACK)
            .long("write-back")
            .value_parser(value_parser!(PathBuf))
            .conflicts_with(NO_FETCH)
            .help("Save the fingerprint of the query video to this file")
            .display_order(get_ordering(WRITE_BACK)),
    );

    cmd
}

pub(super) fn build_app() -> clap::Command {
    //args are not added through method chaining because rustfmt struggles with very long expressions.
    let mut clap_app = clap::Command::new("vpdq")
        .version(clap::crate_version!())
        .about("Fingerprint videos and find matching videos or clips")
        .subcommand_required(true)
        .arg_required_else_help(true);

    clap_app = clap_app.arg(
        clap::Arg::new(OUTPUT_FORMAT)
            .long("format")
            .global(true)
            .value_parser(value_parser!(OutputFormat))
            .default_value("normal")
            .help("Output format")
            .display_order(get_ordering(OUTPUT_FORMAT)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_QUIET)
            .short('q')
            .long("quiet")
            .global(true)
            .num_args(0)
            .action(SetTrue)
            .conflicts_with(VERBOSITY_VERBOSE)
            .help("Only print warnings and errors")
            .display_order(get_ordering(VERBOSITY_QUIET)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_VERBOSE)
            .short('v')
            .long("verbose")
            .global(true)
            .num_args(0)
            .action(SetTrue)
            .help("Print all hash matching information and the causes of errors")
            .display_order(get_ordering(VERBOSITY_VERBOSE)),
    );

    ////////////////////////////////////////////////////////////////////////////
    // hash
    ////////////////////////////////////////////////////////////////////////////
    let mut hash_cmd = clap::Command::new(CMD_HASH).about("Compute the fingerprint of a video");
    hash_cmd = hash_cmd.arg(
        clap::Arg::new(VIDEO)
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("The video to fingerprint")
            .display_order(get_ordering(VIDEO)),
    );
    hash_cmd = hash_cmd.arg(
        clap::Arg::new(OUTPUT_FILE)
            .short('o')
            .long("output")
            .value_parser(value_parser!(PathBuf))
            .help("Write the fingerprint to this file instead of stdout")
            .display_order(get_ordering(OUTPUT_FILE)),
    );
    hash_cmd = add_hashing_args(hash_cmd);

    ////////////////////////////////////////////////////////////////////////////
    // compare
    ////////////////////////////////////////////////////////////////////////////
    let mut compare_cmd = clap::Command::new(CMD_COMPARE).about("Compare a video against another video or a fingerprint file");
    compare_cmd = add_query_args(compare_cmd);
    compare_cmd = compare_cmd.arg(
        clap::Arg::new(WITH_VIDEO)
            .long("with-video")
            .value_parser(value_parser!(PathBuf))
            .help("Compare against this video")
            .display_order(get_ordering(WITH_VIDEO)),
    );
    compare_cmd = compare_cmd.arg(
        clap::Arg::new(WITH_HASHES)
            .long("with-hashes")
            .value_parser(value_parser!(PathBuf))
            .help("Compare against this fingerprint file")
            .display_order(get_ordering(WITH_HASHES)),
    );
    compare_cmd = compare_cmd.group(
        clap::ArgGroup::new("target")
            .args([WITH_VIDEO, WITH_HASHES])
            .required(true)
            .multiple(false),
    );
    compare_cmd = compare_cmd.arg(
        clap::Arg::new(BY_LINE)
            .long("by-line")
            .num_args(0)
            .action(SetTrue)
            .help("Compare frame i of the query with frame i of the target, without aligning. Both must have the same number of frames")
            .display_order(get_ordering(BY_LINE)),
    );
    compare_cmd = add_hashing_args(compare_cmd);
    compare_cmd = add_matching_args(compare_cmd);

    ////////////////////////////////////////////////////////////////////////////
    // search
    ////////////////////////////////////////////////////////////////////////////
    let mut search_cmd = clap::Command::new(CMD_SEARCH).about("Search a directory of fingerprint files for matches to a video");
    search_cmd = add_query_args(search_cmd);
    search_cmd = search_cmd.arg(
        clap::Arg::new(CORPUS_DIR)
            .long("corpus")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Directory containing fingerprint files. Subdirectories are searched too")
            .display_order(get_ordering(CORPUS_DIR)),
    );
    search_cmd = search_cmd.arg(
        clap::Arg::new(MIN_SCORE)
            .long("min-score")
            .value_parser(value_parser!(f64))
            .help("Only report fingerprints where at least this fraction (0..=1) of the query matched [default: 0]")
            .display_order(get_ordering(MIN_SCORE)),
    );
    search_cmd = search_cmd.arg(
        clap::Arg::new(INDEX_BANDS)
            .long("bands")
            .value_parser(value_parser!(usize))
            .help(format!("Number of bit bands used to shortlist candidates. Frames fewer than this many bits apart are always found [default: {DEFAULT_INDEX_BANDS}]"))
            .display_order(get_ordering(INDEX_BANDS)),
    );
    search_cmd = add_hashing_args(search_cmd);
    search_cmd = add_matching_args(search_cmd);

    clap_app
        .subcommand(hash_cmd)
        .subcommand(compare_cmd)
        .subcommand(search_cmd)
}

pub fn parse_args() -> AppCfg {
    let args = build_app().get_matches();
    cfg_from_matches(&args).unwrap_or_else(|e| print_error_and_quit(e))
}

// Subcommands only define some of the args, so look them up without panicking on unknown ids.
fn opt<T: Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str) -> Option<T> {
    args.try_get_one::<T>(id).ok().flatten().cloned()
}

fn flag(args: &ArgMatches, id: &str) -> bool {
    opt::<bool>(args, id).unwrap_or(false)
}

fn required<T: Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str) -> eyre::Result<T> {
    opt(args, id).ok_or_else(|| eyre::eyre!("missing argument: {id}"))
}

pub(super) fn cfg_from_matches(args: &ArgMatches) -> eyre::Result<AppCfg> {
    let (name, sub) = args
        .subcommand()
        .ok_or_else(|| eyre::eyre!("no subcommand given"))?;

    //global args are propagated down into the subcommand.
    let verbosity = if flag(sub, VERBOSITY_QUIET) {
        ReportVerbosity::Quiet
    } else if flag(sub, VERBOSITY_VERBOSE) {
        ReportVerbosity::Verbose
    } else {
        ReportVerbosity::Default
    };
    let format = opt::<OutputFormat>(sub, OUTPUT_FORMAT).unwrap_or(OutputFormat::Normal);

    let hash_options = {
        let defaults = CreationOptions::default();
        let ret = CreationOptions {
            seconds_per_hash: opt(sub, SECONDS_PER_HASH).unwrap_or(defaults.seconds_per_hash),
            hash_threads: opt(sub, THREADS).unwrap_or(defaults.hash_threads),
            max_concurrent_videos: defaults.max_concurrent_videos,
            max_decode_dimension: match opt::<u32>(sub, DOWNSAMPLE) {
                Some(0) => None,
                Some(dim) => Some(dim),
                None => defaults.max_decode_dimension,
            },
            decode_timeout_secs: opt(sub, DECODE_TIMEOUT),
        };
        ret.validate().wrap_err("Invalid hashing options")?;
        ret
    };

    let match_cfg = MatchConfig::new(
        opt(sub, DISTANCE_THRESHOLD).unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
        opt(sub, MIN_QUALITY).unwrap_or(DEFAULT_MIN_QUALITY),
        opt(sub, MIN_RUN_LENGTH).unwrap_or(DEFAULT_MIN_MATCH_RUN_LENGTH),
    )
    .wrap_err("Invalid match options")?;

    let index_cfg = IndexConfig::new(
        opt(sub, INDEX_BANDS).unwrap_or(DEFAULT_INDEX_BANDS),
        opt(sub, MIN_SCORE).unwrap_or(0.0),
    )
    .wrap_err("Invalid search options")?;

    let command = match name {
        CMD_HASH => Command::Hash {
            video: required(sub, VIDEO)?,
            output: opt(sub, OUTPUT_FILE),
        },
        CMD_COMPARE => {
            let target = match (opt(sub, WITH_VIDEO), opt(sub, WITH_HASHES)) {
                (Some(video), _) => Target::Video(video),
                (None, Some(hashes)) => Target::Hashes(hashes),
                (None, None) => return Err(eyre::eyre!("either --with-video or --with-hashes is required")),
            };
            Command::Compare {
                query: required(sub, QUERY)?,
                target,
                by_line: flag(sub, BY_LINE),
            }
        }
        CMD_SEARCH => Command::Search {
            query: required(sub, QUERY)?,
            corpus_dir: required(sub, CORPUS_DIR)?,
        },
        other => return Err(eyre::eyre!("unknown command: {other}")),
    };

    let source_policy = SourcePolicy {
        fetch: !flag(sub, NO_FETCH),
        write_back: opt(sub, WRITE_BACK),
    };

    let ret = AppCfg {
        command,
        hash_options,
        match_cfg,
        index_cfg,
        source_policy,
        allow_partial: flag(sub, ALLOW_PARTIAL),
        output_cfg: OutputCfg { format, verbosity },
    };

    Ok(ret)
}
