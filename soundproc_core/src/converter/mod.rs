//! Streaming transforms applied by a single pipeline stage.
//!
//! Every converter reads its input from the first sample to the last and
//! splits it into three windows: `[0, start)` is copied, `[start, end)` is
//! transformed and `[end, EOF)` is copied again. Crop drops the outer
//! windows instead of copying them.

use std::fs;
use std::path::Path;

use crate::error::{Result, SoundError};
use crate::script::{parse_time, ParsedCommand, OPEN_END};
use crate::wav::{StreamInfo, WavReader, WavWriter};

pub mod crop;
pub mod gain;
pub mod mix;
pub mod mute;

pub use crop::Crop;
pub use gain::Gain;
pub use mix::Mix;
pub use mute::Mute;

/// Everything a converter constructor may validate against.
#[derive(Clone, Copy, Debug)]
pub struct BuildContext<'a> {
    pub command: &'a ParsedCommand,
    /// Shape of the stream the converter will read.
    pub input: StreamInfo,
    /// File the converter will read from, `None` for intermediate files.
    pub input_path: Option<&'a Path>,
}

/// A fully validated edit operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Converter {
    Mute(Mute),
    Gain(Gain),
    Crop(Crop),
    Mix(Mix),
}

impl Converter {
    pub fn verb(&self) -> &'static str {
        match self {
            Converter::Mute(_) => mute::VERB,
            Converter::Gain(_) => gain::VERB,
            Converter::Crop(_) => crop::VERB,
            Converter::Mix(_) => mix::VERB,
        }
    }

    /// Transform all of `input` into `output`, moving at most `chunk`
    /// samples per read.
    pub fn convert(
        &self,
        input: &mut WavReader,
        output: &mut WavWriter,
        chunk: usize,
    ) -> Result<()> {
        let mut buf = vec![0i16; chunk.max(1)];
        input.reset()?;
        match self {
            Converter::Mute(mute) => mute.convert(input, output, &mut buf),
            Converter::Gain(gain) => gain.convert(input, output, &mut buf),
            Converter::Crop(crop) => crop.convert(input, output, &mut buf),
            Converter::Mix(mix) => mix.convert(input, output, &mut buf),
        }
    }

    /// Shape of the stream produced from an input shaped like `input`.
    pub fn output_info(&self, input: StreamInfo) -> StreamInfo {
        match self {
            Converter::Crop(crop) => {
                let window = crop.range.window(input);
                input.with_samples(window.len())
            }
            Converter::Mute(_) | Converter::Gain(_) | Converter::Mix(_) => input,
        }
    }
}

/// Start and optional end of a transform window, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    /// `None` runs through the end of the stream.
    pub end: Option<f64>,
}

impl TimeRange {
    pub const FULL: TimeRange = TimeRange {
        start: 0.0,
        end: None,
    };

    /// Read `[start] [end]` from the literals at `first` and `first + 1`,
    /// checking both against the duration of `input`.
    pub fn from_params(command: &ParsedCommand, first: usize, input: StreamInfo) -> Result<Self> {
        let duration = input.duration();
        let line = command.line;

        let start = match command.literal(first)? {
            Some(param) => parse_time(param, duration, false, line)?,
            None => 0.0,
        };
        let end = match command.literal(first + 1)? {
            Some(param) => {
                Some(parse_time(param, duration, true, line)?).filter(|end| *end != OPEN_END)
            }
            None => None,
        };

        if let Some(end) = end {
            if start > end {
                return Err(SoundError::range(
                    line,
                    format!("start time {start} s is after end time {end} s"),
                ));
            }
        }

        Ok(Self { start, end })
    }

    /// Sample window covered by this range on a stream shaped like `info`.
    pub fn window(&self, info: StreamInfo) -> Window {
        let start = info.seconds_to_sample(self.start);
        let end = self
            .end
            .map_or(info.total_samples, |end| info.seconds_to_sample(end));
        Window {
            start,
            end: end.max(start),
        }
    }
}

/// Half-open sample range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Copy up to `count` samples, or everything left when `count` is `None`.
/// Returns the number of samples copied.
pub(crate) fn copy_samples(
    input: &mut WavReader,
    output: &mut WavWriter,
    count: Option<u64>,
    buf: &mut [i16],
) -> Result<u64> {
    transform_samples(input, output, count, buf, |_| {})
}

/// Like [`copy_samples`], passing every block through `f` before writing.
pub(crate) fn transform_samples(
    input: &mut WavReader,
    output: &mut WavWriter,
    count: Option<u64>,
    buf: &mut [i16],
    mut f: impl FnMut(&mut [i16]),
) -> Result<u64> {
    let mut left = count.unwrap_or(u64::MAX);
    let mut copied = 0;
    while left > 0 {
        let step = left.min(buf.len() as u64) as usize;
        let read = input.read(&mut buf[..step])?;
        if read == 0 {
            break;
        }
        f(&mut buf[..read]);
        output.write(&buf[..read])?;
        left -= read as u64;
        copied += read as u64;
    }
    Ok(copied)
}

/// Whether two paths name the same file on disk.
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
