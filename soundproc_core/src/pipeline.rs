//! Runs a validated list of converters through alternating scratch files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::converter::{BuildContext, Converter};
use crate::error::{Result, SoundError};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::registry::ConverterRegistry;
use crate::script::parse_script;
use crate::wav::{read_info, StreamInfo, WavReader, WavWriter};
use crate::Config;

/// Lifecycle of a [`Pipeline`]. A pipeline only exists once
/// [`Pipeline::new`] has succeeded, so it starts out `Opened`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Source opened and every stage validated.
    Opened,
    /// Executing the stage with this index.
    Running(usize),
    /// Moving the result onto the destination.
    Finalizing,
    Done,
    Failed,
}

/// One validated step of the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    /// Script line the stage was read from.
    pub line: usize,
    pub converter: Converter,
    /// Predicted shape of the stage input.
    pub input: StreamInfo,
    /// Predicted shape of the stage output.
    pub output: StreamInfo,
}

/// Counters collected during a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub stages_executed: usize,
    /// Length of the file written to the destination.
    pub samples_written: u64,
}

/// A script bound to its operand files, validated and ready to run.
pub struct Pipeline {
    config: Config,
    stages: Vec<Stage>,
    state: PipelineState,
}

impl Pipeline {
    /// Parse the script and build every converter up front, so that an
    /// invalid script fails before any sample is written.
    pub fn new(config: Config, registry: &ConverterRegistry) -> Result<Self> {
        let destination = config.destination();
        if !config.overwrite && destination.exists() {
            return Err(SoundError::DestinationExists {
                path: destination.to_path_buf(),
            });
        }

        let commands = parse_script(&config.script, &config.files)?;
        let source = config.source();
        let mut info = read_info(source)?;
        debug!(
            "source '{}' holds {} samples",
            source.display(),
            info.total_samples
        );

        let mut stages = Vec::with_capacity(commands.len());
        for command in &commands {
            let input_path = stages.is_empty().then_some(source);
            let converter = registry.create(&BuildContext {
                command,
                input: info,
                input_path,
            })?;
            let output = converter.output_info(info);
            stages.push(Stage {
                line: command.line,
                converter,
                input: info,
                output,
            });
            info = output;
        }

        Ok(Self {
            config,
            stages,
            state: PipelineState::Opened,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validated stages in execution order.
    pub fn plan(&self) -> &[Stage] {
        &self.stages
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Execute every stage and move the result onto the destination. The
    /// destination is left untouched if any stage fails, and scratch files
    /// are removed on every path. A pipeline runs at most once.
    pub fn run(&mut self, reporter: &mut dyn ProgressReporter) -> Result<RunMetrics> {
        match self.state {
            PipelineState::Done => return Err(SoundError::AlreadyFinished { state: "done" }),
            PipelineState::Failed => return Err(SoundError::AlreadyFinished { state: "failed" }),
            _ => {}
        }

        match self.execute(reporter) {
            Ok(metrics) => {
                self.transition(PipelineState::Done);
                Ok(metrics)
            }
            Err(err) => {
                self.transition(PipelineState::Failed);
                Err(err)
            }
        }
    }

    fn execute(&mut self, reporter: &mut dyn ProgressReporter) -> Result<RunMetrics> {
        let destination = self.config.destination().to_path_buf();
        let source = self.config.source().to_path_buf();
        let chunk = self.config.buffer_size_samples.get();

        info!(
            "applying {} command(s) from '{}' to '{}'",
            self.stages.len(),
            self.config.script.display(),
            source.display()
        );

        let dir = scratch_dir(&destination);
        let scratch = [scratch_file(dir)?, scratch_file(dir)?];
        reporter.report(ProgressEvent::Start {
            stages: self.stages.len(),
        });

        // Index into `scratch` of the newest stage output; `None` until the
        // first stage has run.
        let mut current: Option<usize> = None;
        let mut samples_written = 0;

        for index in 0..self.stages.len() {
            self.transition(PipelineState::Running(index));
            let stage = &self.stages[index];
            reporter.report(ProgressEvent::StageStarted {
                index,
                verb: stage.converter.verb(),
                line: stage.line,
            });
            info!(
                "stage {}/{} (line {}): {}",
                index + 1,
                self.stages.len(),
                stage.line,
                stage.converter.verb()
            );

            let target = current.map_or(0, |current| 1 - current);
            let input_path = current.map_or(source.as_path(), |current| scratch[current].path());

            let mut input = WavReader::open(input_path)?;
            let mut output = WavWriter::create(scratch[target].path())?;
            stage.converter.convert(&mut input, &mut output, chunk)?;
            output.close()?;
            drop(input);

            samples_written = output.position();
            reporter.report(ProgressEvent::StageFinished {
                index,
                samples: samples_written,
            });
            current = Some(target);
        }

        self.transition(PipelineState::Finalizing);
        let [first, second] = scratch;
        let result = match current {
            Some(1) => second,
            Some(_) => first,
            None => {
                fs::copy(&source, first.path()).map_err(|err| SoundError::io(&source, err))?;
                samples_written = read_info(first.path())?.total_samples;
                first
            }
        };
        self.persist(result, &destination)?;

        let permissions = fs::metadata(&source)
            .and_then(|meta| fs::set_permissions(&destination, meta.permissions()));
        if let Err(err) = permissions {
            warn!(
                "could not copy permissions to '{}': {err}",
                destination.display()
            );
        }

        reporter.report(ProgressEvent::Finish);
        info!(
            "wrote {} samples to '{}'",
            samples_written,
            destination.display()
        );

        Ok(RunMetrics {
            stages_executed: self.stages.len(),
            samples_written,
        })
    }

    fn persist(&self, file: NamedTempFile, destination: &Path) -> Result<()> {
        let persisted = if self.config.overwrite {
            file.persist(destination)
        } else {
            file.persist_noclobber(destination)
        };

        match persisted {
            Ok(_) => Ok(()),
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                Err(SoundError::DestinationExists {
                    path: destination.to_path_buf(),
                })
            }
            Err(err) => Err(SoundError::io(destination, err.error)),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Scratch files live next to the destination so the final move is a rename
/// within one filesystem.
fn scratch_dir(destination: &Path) -> &Path {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn scratch_file(dir: &Path) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix(".soundproc-")
        .suffix(".wav")
        .tempfile_in(dir)
        .map_err(|err| SoundError::io(dir, err))?;
    debug!("allocated scratch file '{}'", file.path().display());
    Ok(file)
}

/// Operand files of a run, as given on the command line.
pub(crate) fn check_operands(files: &[PathBuf]) -> Result<()> {
    if files.len() < 2 {
        return Err(SoundError::InsufficientInput { found: files.len() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::wav::{read_samples, write_samples};
    use std::fs;
    use tempfile::tempdir;

    fn setup(script: &str, aux: usize) -> (tempfile::TempDir, Config) {
        let dir = tempdir().unwrap();
        let script_path = dir.path().join("script.txt");
        fs::write(&script_path, script).unwrap();

        let mut files = vec![dir.path().join("out.wav"), dir.path().join("in.wav")];
        let samples: Vec<i16> = (0..44_100).map(|n| (n % 2_000) as i16 - 1_000).collect();
        write_samples(&files[1], &samples).unwrap();
        for n in 0..aux {
            let path = dir.path().join(format!("aux{n}.wav"));
            write_samples(&path, &vec![2_000i16; 44_100]).unwrap();
            files.push(path);
        }

        let config = Config::new(script_path, files).unwrap();
        (dir, config)
    }

    fn leftover_scratch(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(".soundproc-"))
            })
            .collect()
    }

    #[test]
    fn plan_predicts_stage_lengths() {
        let (_dir, config) = setup("gain 2\ncrop 0.25 0.75\nmute 0 0.1\n", 0);
        let pipeline = Pipeline::new(config, &ConverterRegistry::with_defaults()).unwrap();

        let plan = pipeline.plan();
        assert_eq!(pipeline.state(), PipelineState::Opened);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].output.total_samples, 44_100);
        assert_eq!(plan[1].line, 2);
        assert_eq!(plan[1].output.total_samples, 22_050);
        assert_eq!(plan[2].input.total_samples, 22_050);
    }

    #[test]
    fn later_stages_validate_against_predicted_length() {
        // After cropping to half a second, muting up to 0.8 s is out of range.
        let (_dir, config) = setup("crop 0 0.5\nmute 0 0.8\n", 0);
        let err = Pipeline::new(config, &ConverterRegistry::with_defaults())
            .err()
            .expect("second stage should be rejected");
        assert!(matches!(err, SoundError::Range { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn runs_stages_in_order_and_cleans_up() {
        let (dir, config) = setup("crop 0 0.5\nmix $2\n", 1);
        let destination = config.destination().to_path_buf();
        let mut pipeline = Pipeline::new(config, &ConverterRegistry::with_defaults()).unwrap();

        let mut events = Vec::new();
        let mut reporter = |event: ProgressEvent| events.push(event);
        let metrics = pipeline.run(&mut reporter).unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(
            metrics,
            RunMetrics {
                stages_executed: 2,
                samples_written: 22_050
            }
        );
        let output = read_samples(&destination).unwrap();
        assert_eq!(output.len(), 22_050);
        assert_eq!(output[0], -1_000 / 2 + 1_000);
        assert!(leftover_scratch(dir.path()).is_empty());

        assert_eq!(events.first(), Some(&ProgressEvent::Start { stages: 2 }));
        assert!(events.contains(&ProgressEvent::StageStarted {
            index: 1,
            verb: "mix",
            line: 2
        }));
        assert_eq!(events.last(), Some(&ProgressEvent::Finish));
    }

    #[test]
    fn failure_leaves_destination_untouched() {
        let (dir, config) = setup("mix $2\n", 1);
        let destination = config.destination().to_path_buf();
        let aux = config.files[2].clone();
        let mut pipeline = Pipeline::new(config, &ConverterRegistry::with_defaults()).unwrap();

        // Corrupt the auxiliary input after validation so the stage fails.
        fs::write(&aux, b"garbage").unwrap();
        let err = pipeline.run(&mut NoProgress).unwrap_err();

        assert!(matches!(err, SoundError::UnsupportedFormat { .. }), "{err:?}");
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(!destination.exists());
        assert!(leftover_scratch(dir.path()).is_empty());

        let err = pipeline.run(&mut NoProgress).unwrap_err();
        assert!(matches!(err, SoundError::AlreadyFinished { state: "failed" }), "{err:?}");
    }

    #[test]
    fn finished_pipeline_does_not_run_again() {
        let (dir, config) = setup("gain 0.5\n", 0);
        let destination = config.destination().to_path_buf();
        let mut pipeline = Pipeline::new(config, &ConverterRegistry::with_defaults()).unwrap();
        pipeline.run(&mut NoProgress).unwrap();
        let written = fs::read(&destination).unwrap();

        let mut events = Vec::new();
        let mut reporter = |event: ProgressEvent| events.push(event);
        let err = pipeline.run(&mut reporter).unwrap_err();

        assert!(matches!(err, SoundError::AlreadyFinished { state: "done" }), "{err:?}");
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert!(events.is_empty());
        assert_eq!(fs::read(&destination).unwrap(), written);
        assert!(leftover_scratch(dir.path()).is_empty());
    }

    #[test]
    fn refuses_existing_destination_without_overwrite() {
        let (_dir, config) = setup("", 0);
        fs::write(config.destination(), b"keep me").unwrap();

        let err = Pipeline::new(config.clone(), &ConverterRegistry::with_defaults())
            .err()
            .expect("existing destination should be refused");
        assert!(matches!(err, SoundError::DestinationExists { .. }), "{err:?}");

        let config = Config::builder(&config.script, config.files.clone())
            .overwrite(true)
            .build()
            .unwrap();
        let destination = config.destination().to_path_buf();
        let mut pipeline = Pipeline::new(config, &ConverterRegistry::with_defaults()).unwrap();
        pipeline.run(&mut NoProgress).unwrap();
        assert_eq!(read_samples(destination).unwrap().len(), 44_100);
    }

    #[test]
    fn scratch_dir_defaults_to_current_directory() {
        assert_eq!(scratch_dir(Path::new("out.wav")), Path::new("."));
        assert_eq!(scratch_dir(Path::new("a/out.wav")), Path::new("a"));
    }
}
