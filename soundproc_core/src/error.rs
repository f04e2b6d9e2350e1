use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, SoundError>;

/// Errors that can occur while loading, editing or writing audio.
#[derive(Debug, Error)]
pub enum SoundError {
    /// A file required by the run does not exist.
    #[error("file not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    /// Wrapper around IO errors, annotated with the file being accessed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The WAV header is malformed or describes an unsupported layout.
    #[error("unsupported WAV file '{}': {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// The chunk list ended before a `data` chunk was found.
    #[error("WAV file '{}' has no data chunk", path.display())]
    MissingDataChunk { path: PathBuf },

    /// The data chunk declares more bytes than the file holds.
    #[error(
        "WAV file '{}' is truncated: {declared} data bytes declared, {available} present",
        path.display()
    )]
    Truncated {
        path: PathBuf,
        declared: u64,
        available: u64,
    },

    /// A sample write was attempted after the writer was finalized.
    #[error("cannot write to '{}': stream already closed", path.display())]
    WriteAfterClose { path: PathBuf },

    /// A script line could not be understood.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A script parameter was understood but lies outside its valid range.
    #[error("line {line}: {message}")]
    Range { line: usize, message: String },

    /// The script names a converter that is not registered.
    #[error("line {line}: unknown command '{verb}'")]
    UnknownCommand { line: usize, verb: String },

    /// Fewer operand files than the destination plus one source.
    #[error("expected at least 2 files (output and input), got {found}")]
    InsufficientInput { found: usize },

    /// The destination exists and overwriting was not requested.
    #[error("destination '{}' already exists", path.display())]
    DestinationExists { path: PathBuf },

    /// A pipeline that already finished was asked to run again.
    #[error("pipeline already finished ({state})")]
    AlreadyFinished { state: &'static str },
}

impl SoundError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn range(line: usize, message: impl Into<String>) -> Self {
        Self::Range {
            line,
            message: message.into(),
        }
    }

    /// Script line that produced the error, if the error came from a script.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Parse { line, .. }
            | Self::Range { line, .. }
            | Self::UnknownCommand { line, .. } => Some(*line),
            _ => None,
        }
    }
}
