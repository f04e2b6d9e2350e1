use super::{copy_samples, BuildContext, Converter, TimeRange};
use crate::error::Result;
use crate::wav::{WavReader, WavWriter};

pub const VERB: &str = "mute";
pub const DESCRIPTION: &str = "Replace a time range with silence";
pub const USAGE: &str = "mute [start] [end]";

/// Silences `range`, keeping the stream length.
#[derive(Clone, Debug, PartialEq)]
pub struct Mute {
    pub range: TimeRange,
}

impl Mute {
    pub fn build(ctx: &BuildContext<'_>) -> Result<Converter> {
        ctx.command.expect_at_most(2)?;
        let range = TimeRange::from_params(ctx.command, 0, ctx.input)?;
        Ok(Converter::Mute(Mute { range }))
    }

    pub(crate) fn convert(
        &self,
        input: &mut WavReader,
        output: &mut WavWriter,
        buf: &mut [i16],
    ) -> Result<()> {
        let window = self.range.window(input.info());

        copy_samples(input, output, Some(window.start), buf)?;
        input.skip(window.len())?;
        output.write_silence(window.len())?;
        copy_samples(input, output, None, buf)?;
        Ok(())
    }
}
