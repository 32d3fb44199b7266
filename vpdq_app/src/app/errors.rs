use std::path::PathBuf;

use thiserror::Error;
use vpdq_lib::*;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Hash Creation Error: {0}")]
    CreateHashError(#[from] HashCreationErrorKind),

    #[error("Decoding of {path} stopped early ({error}). Use --allow-partial to accept a partial fingerprint")]
    IncompleteDecode { path: PathBuf, error: DecodeError },

    #[cfg(not(feature = "ffmpeg_backend"))]
    #[error("Cannot hash {0}: built without a video decoding backend")]
    NoVideoBackend(PathBuf),

    #[error("Hashing of {0} was cancelled")]
    Cancelled(PathBuf),

    #[error("Failed to read fingerprint file {path}: {source}")]
    ReadFingerprint {
        path: PathBuf,
        #[source]
        source: FingerprintFileError,
    },

    #[error("Failed to write fingerprint file {path}: {source}")]
    WriteFingerprint {
        path: PathBuf,
        #[source]
        source: FingerprintFileError,
    },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    LineMatch(#[from] LengthMismatch),
}

pub fn print_error_and_quit(e: eyre::Report) -> ! {
    #[allow(clippy::print_stderr)]
    let () = eprintln!("{:?}", e);
    std::process::exit(1);
}
