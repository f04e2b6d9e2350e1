use soundproc_core::wav::{read_samples, WavReader};
use soundproc_core::{
    plan, run, run_with_metrics, Config, ProgressEvent, ProgressReporter, SoundError,
};
use std::error::Error;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tempfile::{tempdir, TempDir};

const SAMPLE_RATE: u32 = 44_100;

/// Generate a mono 16-bit sine tone at runtime.
///
/// The header is emitted by hand rather than through the crate's writer so
/// the fixtures do not depend on the code under test. An optional `LIST`
/// chunk is placed between `fmt ` and `data` to exercise chunk skipping.
fn write_test_tone<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency: f32,
    with_list_chunk: bool,
) -> Result<Vec<i16>, Box<dyn Error>> {
    let total_samples = (u64::from(SAMPLE_RATE) * duration_ms / 1_000) as usize;
    let samples: Vec<i16> = (0..total_samples)
        .map(|n| {
            let theta = (n as f32 / SAMPLE_RATE as f32) * 2.0 * std::f32::consts::PI * frequency;
            (theta.sin() * i16::MAX as f32 * 0.8) as i16
        })
        .collect();

    let list: &[u8] = if with_list_chunk { b"LIST\x04\0\0\0INFO" } else { b"" };
    let data_len = (samples.len() * 2) as u32;
    let chunk_size = 36u32 + list.len() as u32 + data_len;

    let mut file = File::create(path)?;
    file.write_all(b"RIFF")?;
    file.write_all(&chunk_size.to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?; // PCM header size
    file.write_all(&1u16.to_le_bytes())?; // audio format = PCM
    file.write_all(&1u16.to_le_bytes())?; // channels
    file.write_all(&SAMPLE_RATE.to_le_bytes())?;
    file.write_all(&(SAMPLE_RATE * 2).to_le_bytes())?;
    file.write_all(&2u16.to_le_bytes())?; // block align
    file.write_all(&16u16.to_le_bytes())?; // bits per sample
    file.write_all(list)?;
    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;
    for sample in &samples {
        file.write_all(&sample.to_le_bytes())?;
    }
    Ok(samples)
}

struct Workspace {
    dir: TempDir,
    files: Vec<PathBuf>,
    source: Vec<i16>,
}

impl Workspace {
    fn new(duration_ms: u64, aux: usize) -> Result<Self, Box<dyn Error>> {
        let dir = tempdir()?;
        let mut files = vec![dir.path().join("output.wav"), dir.path().join("input.wav")];
        let source = write_test_tone(&files[1], duration_ms, 440.0, false)?;
        for n in 0..aux {
            let path = dir.path().join(format!("aux{n}.wav"));
            write_test_tone(&path, duration_ms, 660.0 + n as f32 * 110.0, false)?;
            files.push(path);
        }
        Ok(Self { dir, files, source })
    }

    fn config(&self, script: &str) -> Result<Config, Box<dyn Error>> {
        let script_path = self.dir.path().join("config.txt");
        fs::write(&script_path, script)?;
        Ok(Config::new(script_path, &self.files)?)
    }

    fn output(&self) -> &Path {
        &self.files[0]
    }

    fn scratch_files(&self) -> Result<Vec<PathBuf>, Box<dyn Error>> {
        let mut leftovers = Vec::new();
        for entry in fs::read_dir(self.dir.path())? {
            let path = entry?.path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.starts_with(".soundproc-") {
                leftovers.push(path);
            }
        }
        Ok(leftovers)
    }
}

fn decode_with_symphonia(path: &Path) -> Result<Vec<i16>, Box<dyn Error>> {
    let mut hint = Hint::new();
    hint.with_extension("wav");

    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut reader = probed.format;

    let track = reader.default_track().ok_or("no default track")?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    assert_eq!(params.sample_rate, Some(SAMPLE_RATE));

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
    let mut samples = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder.decode(&packet)?;
        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }
    Ok(samples)
}

#[test]
fn mute_zeroes_the_requested_window() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(1_000, 0)?;
    run(workspace.config("mute 0.2 0.5\n")?)?;

    let output = read_samples(workspace.output())?;
    assert_eq!(output.len(), 44_100);
    assert!(output[8_820..22_050].iter().all(|&s| s == 0));
    assert_eq!(output[..8_820], workspace.source[..8_820]);
    assert_eq!(output[22_050..], workspace.source[22_050..]);
    assert!(workspace.scratch_files()?.is_empty());
    Ok(())
}

#[test]
fn empty_script_copies_the_source_byte_for_byte() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(250, 0)?;
    run(workspace.config("# nothing to do\n\n   \n")?)?;

    assert_eq!(fs::read(workspace.output())?, fs::read(&workspace.files[1])?);
    assert!(workspace.scratch_files()?.is_empty());
    Ok(())
}

#[test]
fn trailing_comments_are_ignored() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(500, 0)?;
    run(workspace.config("mute 0.1 0.3  # silence the intro\ngain 2.0 # louder\n")?)?;

    let output = read_samples(workspace.output())?;
    assert_eq!(output.len(), 22_050);
    assert!(output[4_410..13_229].iter().all(|&s| s == 0));
    assert_eq!(output[100], workspace.source[100].saturating_mul(2));
    Ok(())
}

#[test]
fn invalid_factor_fails_before_touching_the_destination() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(250, 0)?;
    let err = run(workspace.config("mute 0 0.1\ngain abc\n")?).expect_err("bad factor");

    match err {
        SoundError::Parse { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!workspace.output().exists());
    assert!(workspace.scratch_files()?.is_empty());
    Ok(())
}

#[test]
fn out_of_range_file_reference_reports_its_line() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(250, 0)?;
    let err = run(workspace.config("# header\nmix $5 0 0.1\n")?).expect_err("bad reference");

    assert!(matches!(err, SoundError::Range { line: 2, .. }), "{err:?}");
    assert!(err.to_string().starts_with("line 2:"));
    assert!(!workspace.output().exists());
    Ok(())
}

#[test]
fn unknown_command_is_rejected() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(250, 0)?;
    let err = run(workspace.config("mute\nreverse 0 1\n")?).expect_err("unknown verb");

    match err {
        SoundError::UnknownCommand { line, verb } => {
            assert_eq!(line, 2);
            assert_eq!(verb, "reverse");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!workspace.output().exists());
    Ok(())
}

#[test]
fn missing_script_and_operands_are_reported() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(250, 0)?;
    let config = Config::new(workspace.dir.path().join("absent.txt"), &workspace.files)?;
    let err = run(config).expect_err("missing script");
    assert!(matches!(err, SoundError::NotFound { .. }), "{err:?}");

    let err = Config::new("config.txt", [workspace.output()]).expect_err("one operand");
    assert!(matches!(err, SoundError::InsufficientInput { found: 1 }));
    Ok(())
}

#[test]
fn stages_apply_in_script_order() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(1_000, 1)?;
    let aux = read_samples(&workspace.files[2])?;
    let script = "\
# louder, then keep the middle, then blend in the second tone
gain 2
crop 0.25 0.75
mix $2 0 -1
";
    run(workspace.config(script)?)?;

    let output = read_samples(workspace.output())?;
    assert_eq!(output.len(), 22_050);
    for (i, sample) in output.iter().enumerate() {
        let gained = (f64::from(workspace.source[11_025 + i]) * 2.0)
            .trunc()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        assert_eq!(*sample, gained / 2 + aux[i] / 2, "sample {i}");
    }
    Ok(())
}

#[test]
fn non_canonical_source_is_accepted() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(250, 0)?;
    let source = write_test_tone(&workspace.files[1], 250, 220.0, true)?;
    run(workspace.config("crop 0.1 -1\n")?)?;

    let output = read_samples(workspace.output())?;
    assert_eq!(output[..], source[4_410..]);

    let reader = WavReader::open(workspace.output())?;
    assert_eq!(fs::metadata(workspace.output())?.len(), 44 + reader.total_samples() * 2);
    Ok(())
}

#[test]
fn output_decodes_with_symphonia() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(500, 0)?;
    run(workspace.config("gain 0.5 0.1 0.3\n")?)?;

    let ours = read_samples(workspace.output())?;
    let theirs = decode_with_symphonia(workspace.output())?;
    assert_eq!(ours, theirs);
    Ok(())
}

#[test]
fn plan_validates_without_writing() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(1_000, 0)?;
    let stages = plan(workspace.config("crop 0 0.5\nmute 0.1 0.2\n")?)?;

    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0].converter.verb(), "crop");
    assert_eq!(stages[1].output.total_samples, 22_050);
    assert!(!workspace.output().exists());
    assert!(workspace.scratch_files()?.is_empty());
    Ok(())
}

#[derive(Default)]
struct RecordingProgress {
    events: Vec<ProgressEvent>,
}

impl ProgressReporter for RecordingProgress {
    fn report(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }
}

#[test]
fn small_buffers_produce_identical_output() -> Result<(), Box<dyn Error>> {
    let workspace = Workspace::new(1_000, 1)?;
    let script = "gain 1.5 0.1 0.9\nmix $2 0.2\nmute 0.4 0.45\n";

    run(workspace.config(script)?)?;
    let expected = fs::read(workspace.output())?;

    let script_path = workspace.dir.path().join("config.txt");
    let config = Config::builder(&script_path, &workspace.files)
        .overwrite(true)
        .buffer_size_samples(NonZeroUsize::new(7).expect("non-zero"))
        .build()?;
    let mut progress = RecordingProgress::default();
    let metrics = run_with_metrics(config, &mut progress)?;

    assert_eq!(metrics.stages_executed, 3);
    assert_eq!(metrics.samples_written, 44_100);
    assert_eq!(fs::read(workspace.output())?, expected);
    assert_eq!(progress.events.len(), 1 + 3 * 2 + 1);
    Ok(())
}
