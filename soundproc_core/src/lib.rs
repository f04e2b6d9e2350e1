//! Script-driven editing of mono 16-bit PCM WAV files.
//!
//! A run takes an edit script and a list of operand files: the destination
//! first, then the source, then any extra inputs the script refers to as
//! `$2`, `$3`, ... Each script line becomes one pipeline stage; stages are
//! chained through scratch files and the final result is moved onto the
//! destination only once every stage has succeeded.
//!
//! ```no_run
//! use soundproc_core::{run, Config};
//!
//! let config = Config::new("edits.txt", ["out.wav", "in.wav", "music.wav"])?;
//! run(config)?;
//! # Ok::<(), soundproc_core::SoundError>(())
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub mod converter;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod script;
pub mod wav;

pub use converter::{Converter, TimeRange, Window};
pub use error::{Result, SoundError};
pub use pipeline::{Pipeline, PipelineState, RunMetrics, Stage};
pub use progress::{NoProgress, ProgressEvent, ProgressReporter};
pub use registry::ConverterRegistry;
pub use script::{parse_script, ParsedCommand};
pub use wav::{StreamInfo, WavHeader, WavReader, WavWriter};

/// Samples moved per read when no buffer size is configured: one second.
pub const DEFAULT_BUFFER_SAMPLES: usize = wav::SAMPLE_RATE as usize;

/// Configuration for a single pipeline run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Path of the edit script.
    pub script: PathBuf,
    /// Operand files: destination, source, then auxiliary inputs.
    pub files: Vec<PathBuf>,
    /// Replace the destination if it already exists.
    pub overwrite: bool,
    /// Maximum number of samples held in memory per read.
    pub buffer_size_samples: NonZeroUsize,
}

impl Config {
    /// Construct a new [`Config`] with default options.
    pub fn new<P, I>(script: P, files: I) -> Result<Self>
    where
        P: AsRef<Path>,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        Self::builder(script, files).build()
    }

    /// Start building a [`Config`] with non-default options.
    pub fn builder<P, I>(script: P, files: I) -> ConfigBuilder
    where
        P: AsRef<Path>,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        ConfigBuilder {
            script: script.as_ref().to_path_buf(),
            files: files
                .into_iter()
                .map(|file| file.as_ref().to_path_buf())
                .collect(),
            overwrite: false,
            buffer_size_samples: NonZeroUsize::new(DEFAULT_BUFFER_SAMPLES)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// File the final result is written to.
    pub fn destination(&self) -> &Path {
        &self.files[0]
    }

    /// File the first stage reads.
    pub fn source(&self) -> &Path {
        &self.files[1]
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    script: PathBuf,
    files: Vec<PathBuf>,
    overwrite: bool,
    buffer_size_samples: NonZeroUsize,
}

impl ConfigBuilder {
    /// Allow replacing an existing destination file.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Limit how many samples are read at once.
    pub fn buffer_size_samples(mut self, samples: NonZeroUsize) -> Self {
        self.buffer_size_samples = samples;
        self
    }

    /// Finish the configuration, checking that a destination and a source
    /// were both given.
    pub fn build(self) -> Result<Config> {
        pipeline::check_operands(&self.files)?;
        Ok(Config {
            script: self.script,
            files: self.files,
            overwrite: self.overwrite,
            buffer_size_samples: self.buffer_size_samples,
        })
    }
}

/// Validate and execute the script described by `config`.
pub fn run(config: Config) -> Result<()> {
    run_with_progress(config, NoProgress)
}

/// Like [`run`], reporting progress to `reporter`.
pub fn run_with_progress<R: ProgressReporter>(config: Config, mut reporter: R) -> Result<()> {
    run_with_metrics(config, &mut reporter).map(|_| ())
}

/// Like [`run`], returning counters describing the run.
pub fn run_with_metrics<R: ProgressReporter>(
    config: Config,
    reporter: &mut R,
) -> Result<RunMetrics> {
    let registry = ConverterRegistry::with_defaults();
    let mut pipeline = Pipeline::new(config, &registry)?;
    pipeline.run(reporter)
}

/// Validate `config` without writing anything and return the stages that
/// would run.
pub fn plan(config: Config) -> Result<Vec<Stage>> {
    let registry = ConverterRegistry::with_defaults();
    let pipeline = Pipeline::new(config, &registry)?;
    Ok(pipeline.plan().to_vec())
}
