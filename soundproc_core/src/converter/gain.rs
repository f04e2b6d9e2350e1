use super::{copy_samples, transform_samples, BuildContext, Converter, TimeRange};
use crate::error::{Result, SoundError};
use crate::script::parse_factor;
use crate::wav::{WavReader, WavWriter};

pub const VERB: &str = "gain";
pub const DESCRIPTION: &str = "Scale the volume of a time range";
pub const USAGE: &str = "gain <factor> [start] [end]";

/// Smallest accepted factor.
pub const MIN_FACTOR: f64 = 0.0;
/// Largest accepted factor.
pub const MAX_FACTOR: f64 = 10.0;

/// Multiplies samples in `range` by `factor`, saturating at the `i16` limits.
#[derive(Clone, Debug, PartialEq)]
pub struct Gain {
    pub factor: f64,
    pub range: TimeRange,
}

impl Gain {
    pub fn build(ctx: &BuildContext<'_>) -> Result<Converter> {
        let command = ctx.command;
        command.expect_at_most(3)?;

        let factor = command.literal(0)?.ok_or_else(|| {
            SoundError::parse(command.line, format!("missing factor, usage: {USAGE}"))
        })?;
        let factor = parse_factor(factor, MIN_FACTOR, MAX_FACTOR, command.line)?;
        let range = TimeRange::from_params(command, 1, ctx.input)?;

        Ok(Converter::Gain(Gain { factor, range }))
    }

    pub(crate) fn convert(
        &self,
        input: &mut WavReader,
        output: &mut WavWriter,
        buf: &mut [i16],
    ) -> Result<()> {
        let window = self.range.window(input.info());

        copy_samples(input, output, Some(window.start), buf)?;
        transform_samples(input, output, Some(window.len()), buf, |block| {
            for sample in block.iter_mut() {
                *sample = apply(*sample, self.factor);
            }
        })?;
        copy_samples(input, output, None, buf)?;
        Ok(())
    }
}

/// Scale one sample, truncating toward zero and clamping to the `i16` range.
pub fn apply(sample: i16, factor: f64) -> i16 {
    let scaled = (f64::from(sample) * factor).trunc();
    scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}
