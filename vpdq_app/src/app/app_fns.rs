#[cfg(feature = "parallel_loading")]
use rayon::prelude::*;
use std::{
    error::Error,
    io::{prelude::*, BufWriter},
    path::{Path, PathBuf},
};
use vpdq_lib::*;
use walkdir::WalkDir;

use crate::app::*;

//the corpus directory of `search` is scanned for files with this extension.
const FINGERPRINT_EXTENSION: &str = "vpdq";

pub fn run_app() -> i32 {
    let cfg = arg_parse::parse_args();
    configure_logs(cfg.output_cfg.verbosity);

    match run_app_inner(&cfg) {
        Ok(()) => 0,
        Err(fatal_error) => {
            print_fatal_err(fatal_error, cfg.output_cfg.verbosity);
            1
        }
    }
}

fn run_app_inner(cfg: &AppCfg) -> eyre::Result<()> {
    match &cfg.command {
        Command::Hash { video, output } => run_hash(cfg, video, output.as_deref()),
        Command::Compare { query, target, by_line } => run_compare(cfg, query, target, *by_line),
        Command::Search { query, corpus_dir } => run_search(cfg, query, corpus_dir),
    }
}

fn run_hash(cfg: &AppCfg, video: &Path, output: Option<&Path>) -> eyre::Result<()> {
    let seq = fingerprint_video(cfg, video)?;

    match output {
        Some(path) => write_fingerprint(&seq, path)?,
        None => {
            let mut out = BufWriter::new(std::io::stdout().lock());
            codec::write_to(&seq, &mut out).map_err(AppError::Output)?;
            out.flush().map_err(AppError::Output)?;
        }
    }

    Ok(())
}

fn run_compare(cfg: &AppCfg, query: &Path, target: &Target, by_line: bool) -> eyre::Result<()> {
    let query_seq = load_query(cfg, query)?;
    let target_seq = match target {
        Target::Video(path) => fingerprint_video(cfg, path)?,
        Target::Hashes(path) => read_fingerprint(path)?,
    };

    let output = if by_line {
        CompareOutput::ByLine(match_by_line(&query_seq, &target_seq, &cfg.match_cfg).map_err(AppError::from)?)
    } else {
        CompareOutput::Aligned(match_sequences(&query_seq, &target_seq, &cfg.match_cfg))
    };

    let verbose = cfg.output_cfg.verbosity == ReportVerbosity::Verbose;
    let mut out = BufWriter::new(std::io::stdout().lock());
    output
        .write(cfg.output_cfg.format, verbose, &mut out)
        .and_then(|()| out.flush())
        .map_err(AppError::Output)?;

    Ok(())
}

fn run_search(cfg: &AppCfg, query: &Path, corpus_dir: &Path) -> eyre::Result<()> {
    if !corpus_dir.is_dir() {
        return Err(eyre::Report::msg(format!(
            "corpus directory not found: {}",
            corpus_dir.to_string_lossy()
        )));
    }

    let query_seq = load_query(cfg, query)?;

    let mut index = FeatureIndex::new(cfg.index_cfg);
    for (path, seq) in load_corpus(corpus_dir) {
        index.insert(path, seq);
    }
    info!(target: "search", "searching {} stored fingerprints", index.len());

    let hits = index
        .query(&query_seq, &cfg.match_cfg)
        .into_iter()
        .map(|IndexMatch { id, result }| SearchHit {
            path: id.clone(),
            result,
        })
        .collect();
    let output = SearchOutput::new(hits);
    info!(target: "search", "{} matches", output.len());

    let verbose = cfg.output_cfg.verbosity == ReportVerbosity::Verbose;
    let mut out = BufWriter::new(std::io::stdout().lock());
    output
        .write(cfg.output_cfg.format, verbose, &mut out)
        .and_then(|()| out.flush())
        .map_err(AppError::Output)?;

    Ok(())
}

// The query is hashed from its video unless fetching is disabled, in which case it must
// already be a fingerprint file.
fn load_query(cfg: &AppCfg, query: &Path) -> Result<FeatureSequence, AppError> {
    if !cfg.source_policy.fetch {
        return read_fingerprint(query);
    }

    let seq = fingerprint_video(cfg, query)?;
    if let Some(write_back) = &cfg.source_policy.write_back {
        write_fingerprint(&seq, write_back)?;
        info!(target: "app", "wrote fingerprint of {} to {}", query.display(), write_back.display());
    }

    Ok(seq)
}

#[cfg(feature = "ffmpeg_backend")]
fn fingerprint_video(cfg: &AppCfg, video: &Path) -> Result<FeatureSequence, AppError> {
    let builder = VpdqHashBuilder::from_options(cfg.hash_options)?;
    let outcome = builder.hash_path(video, &CancelToken::default())?;

    match outcome.completion {
        Completion::Complete => (),
        Completion::Incomplete(error) if cfg.allow_partial => warn!(
            target: "app",
            "{}: decoding stopped early ({error}), keeping {} features",
            video.display(),
            outcome.sequence.len()
        ),
        Completion::Incomplete(error) => {
            return Err(AppError::IncompleteDecode {
                path: video.to_path_buf(),
                error,
            })
        }
        Completion::Cancelled => return Err(AppError::Cancelled(video.to_path_buf())),
    }

    Ok(outcome.sequence)
}

#[cfg(not(feature = "ffmpeg_backend"))]
fn fingerprint_video(_cfg: &AppCfg, video: &Path) -> Result<FeatureSequence, AppError> {
    Err(AppError::NoVideoBackend(video.to_path_buf()))
}

fn read_fingerprint(path: &Path) -> Result<FeatureSequence, AppError> {
    codec::read_file(path).map_err(|source| AppError::ReadFingerprint {
        path: path.to_path_buf(),
        source,
    })
}

fn write_fingerprint(seq: &FeatureSequence, path: &Path) -> Result<(), AppError> {
    codec::write_file(seq, path).map_err(|source| AppError::WriteFingerprint {
        path: path.to_path_buf(),
        source,
    })
}

/// Load every `.vpdq` file under `corpus_dir`, sorted by path. Files that are not valid
/// fingerprints are skipped with a warning.
fn load_corpus(corpus_dir: &Path) -> Vec<(PathBuf, FeatureSequence)> {
    let mut paths = WalkDir::new(corpus_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => {
                let is_fingerprint = entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == FINGERPRINT_EXTENSION);
                is_fingerprint.then(|| entry.into_path())
            }
            Err(e) => {
                warn!(target: "app", "{e}");
                None
            }
        })
        .collect::<Vec<_>>();
    paths.sort();

    #[cfg(feature = "parallel_loading")]
    let paths_iter = paths.into_par_iter();
    #[cfg(not(feature = "parallel_loading"))]
    let paths_iter = paths.into_iter();

    let loaded = paths_iter
        .map(|path| {
            let seq = codec::read_file(&path);
            (path, seq)
        })
        .collect::<Vec<_>>();

    loaded
        .into_iter()
        .filter_map(|(path, seq)| match seq {
            Ok(seq) => Some((path, seq)),
            Err(e) => {
                warn!(target: "app", "skipping {}: {e}", path.display());
                None
            }
        })
        .collect()
}

fn print_fatal_err(fatal_err: eyre::Report, verbosity: ReportVerbosity) {
    error!(target: "app-errorlog", "{}", fatal_err);

    if verbosity == ReportVerbosity::Verbose {
        let mut source: Option<&(dyn Error + 'static)> = fatal_err.source();
        while let Some(e) = source {
            error!(target: "app-errorlog", "    caused by: {}", e);
            source = e.source();
        }
    }
}

pub fn configure_logs(verbosity: ReportVerbosity) {
    use simplelog::*;

    let min_loglevel = match verbosity {
        ReportVerbosity::Quiet => LevelFilter::Warn,
        ReportVerbosity::Default => LevelFilter::Info,
        ReportVerbosity::Verbose => LevelFilter::Trace,
    };

    TermLogger::init(
        min_loglevel,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .expect("TermLogger failed to initialize");
}

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use vpdq_lib::test_util::random_sequence;

    use super::*;

    #[test]
    fn test_load_corpus_skips_other_and_malformed_files() {
        let mut rng = StdRng::seed_from_u64(3);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let a = random_sequence(4, &mut rng);
        let b = random_sequence(6, &mut rng);
        codec::write_file(&a, dir.path().join("a.vpdq")).unwrap();
        codec::write_file(&b, dir.path().join("nested").join("b.vpdq")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a fingerprint\n").unwrap();
        std::fs::write(dir.path().join("broken.vpdq"), "1,2,3\n").unwrap();

        let corpus = load_corpus(dir.path());
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0].0, dir.path().join("a.vpdq"));
        assert_eq!(corpus[0].1.len(), 4);
        assert_eq!(corpus[1].0, dir.path().join("nested").join("b.vpdq"));
        assert_eq!(corpus[1].1.len(), 6);
    }

    #[test]
    fn test_missing_fingerprint_is_an_error() {
        let err = read_fingerprint(Path::new("/no/such/file.vpdq")).unwrap_err();
        assert!(matches!(err, AppError::ReadFingerprint { .. }));
    }

    #[test]
    fn test_fingerprint_errors_name_the_cause() {
        let mut rng = StdRng::seed_from_u64(4);
        let dir = tempfile::tempdir().unwrap();

        let good_line = codec::encode(&random_sequence(1, &mut rng));
        let bad = dir.path().join("bad.vpdq");
        std::fs::write(&bad, format!("{good_line}0,50,abc,1.000\n")).unwrap();

        let report = eyre::Report::from(read_fingerprint(&bad).unwrap_err());
        let message = report.to_string();
        assert!(message.contains("bad.vpdq"), "{message}");
        assert!(message.contains("line 2"), "{message}");

        let unwritable = dir.path().join("missing_dir").join("out.vpdq");
        let err = write_fingerprint(&random_sequence(1, &mut rng), &unwritable).unwrap_err();
        assert!(err.to_string().contains("I/O error"), "{err}");
    }
}
