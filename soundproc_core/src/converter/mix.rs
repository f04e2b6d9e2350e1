use std::path::PathBuf;

use log::debug;

use super::{copy_samples, same_file, BuildContext, Converter, TimeRange};
use crate::error::{Result, SoundError};
use crate::script::Param;
use crate::wav::{read_info, WavReader, WavWriter};

pub const VERB: &str = "mix";
pub const DESCRIPTION: &str = "Average a time range with another input file";
pub const USAGE: &str = "mix $<n> [start] [end]";

/// Averages `range` of the stream with the same range of `other`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mix {
    pub other: PathBuf,
    pub range: TimeRange,
    /// `other` is the stream being converted, so mixing leaves it unchanged.
    pub same_as_input: bool,
}

impl Mix {
    pub fn build(ctx: &BuildContext<'_>) -> Result<Converter> {
        let command = ctx.command;
        command.expect_at_most(3)?;

        let other = match command.params.first() {
            Some(Param::File { path, .. }) => path.clone(),
            Some(Param::Literal(token)) => {
                return Err(SoundError::parse(
                    command.line,
                    format!("expected a file reference, found '{token}', usage: {USAGE}"),
                ));
            }
            None => {
                return Err(SoundError::parse(
                    command.line,
                    format!("missing file reference, usage: {USAGE}"),
                ));
            }
        };

        let same_as_input = ctx
            .input_path
            .is_some_and(|input| same_file(&other, input));
        if !same_as_input {
            read_info(&other)?;
        }
        let range = TimeRange::from_params(command, 1, ctx.input)?;

        Ok(Converter::Mix(Mix {
            other,
            range,
            same_as_input,
        }))
    }

    pub(crate) fn convert(
        &self,
        input: &mut WavReader,
        output: &mut WavWriter,
        buf: &mut [i16],
    ) -> Result<()> {
        let window = self.range.window(input.info());

        copy_samples(input, output, Some(window.start), buf)?;

        if self.same_as_input {
            debug!("mix source is the input itself, passing window through");
            copy_samples(input, output, Some(window.len()), buf)?;
        } else {
            let mut other = WavReader::open(&self.other)?;
            other.skip_to(window.start)?;
            let mut other_buf = vec![0i16; buf.len()];

            let mut left = window.len();
            while left > 0 {
                let step = left.min(buf.len() as u64) as usize;
                let read = input.read(&mut buf[..step])?;
                if read == 0 {
                    break;
                }
                let mixed = other.read(&mut other_buf[..read])?;
                for (sample, extra) in buf[..mixed].iter_mut().zip(&other_buf[..mixed]) {
                    *sample = average(*sample, *extra);
                }
                output.write(&buf[..read])?;
                left -= read as u64;
            }
        }

        copy_samples(input, output, None, buf)?;
        Ok(())
    }
}

/// Truncating average that cannot overflow.
pub fn average(a: i16, b: i16) -> i16 {
    a / 2 + b / 2
}
