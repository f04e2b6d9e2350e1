use super::{copy_samples, BuildContext, Converter, TimeRange};
use crate::error::Result;
use crate::wav::{WavReader, WavWriter};

pub const VERB: &str = "crop";
pub const DESCRIPTION: &str = "Keep only a time range";
pub const USAGE: &str = "crop [start] [end]";

/// Keeps `range` and drops everything around it.
#[derive(Clone, Debug, PartialEq)]
pub struct Crop {
    pub range: TimeRange,
}

impl Crop {
    pub fn build(ctx: &BuildContext<'_>) -> Result<Converter> {
        ctx.command.expect_at_most(2)?;
        let range = TimeRange::from_params(ctx.command, 0, ctx.input)?;
        Ok(Converter::Crop(Crop { range }))
    }

    pub(crate) fn convert(
        &self,
        input: &mut WavReader,
        output: &mut WavWriter,
        buf: &mut [i16],
    ) -> Result<()> {
        let window = self.range.window(input.info());

        input.skip_to(window.start)?;
        copy_samples(input, output, Some(window.len()), buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::test_support::{build, ramp, run};
    use crate::error::SoundError;
    use crate::wav::write_samples;
    use tempfile::tempdir;

    #[test]
    fn output_length_equals_window() {
        let dir = tempdir().unwrap();
        let files = vec![dir.path().join("out.wav"), dir.path().join("in.wav")];
        let samples = ramp(44_100);
        write_samples(&files[1], &samples).unwrap();

        let converter = build(Crop::build, "crop 0.25 0.75", &files).unwrap();
        let output = run(&converter, &files[1], &files[0], 1_024);

        assert_eq!(output.len(), 22_050);
        assert_eq!(output[..], samples[11_025..33_075]);
    }

    #[test]
    fn open_end_keeps_the_tail() {
        let dir = tempdir().unwrap();
        let files = vec![dir.path().join("out.wav"), dir.path().join("in.wav")];
        let samples = ramp(44_100);
        write_samples(&files[1], &samples).unwrap();

        let converter = build(Crop::build, "crop 0.5 -1", &files).unwrap();
        let output = run(&converter, &files[1], &files[0], 1_024);
        assert_eq!(output[..], samples[22_050..]);
    }

    #[test]
    fn full_range_is_identity() {
        let dir = tempdir().unwrap();
        let files = vec![dir.path().join("out.wav"), dir.path().join("in.wav")];
        let samples = ramp(44_100);
        write_samples(&files[1], &samples).unwrap();

        let converter = build(Crop::build, "crop 0 1", &files).unwrap();
        assert_eq!(run(&converter, &files[1], &files[0], 4_096), samples);
    }

    #[test]
    fn rejects_reversed_range() {
        let dir = tempdir().unwrap();
        let files = vec![dir.path().join("out.wav"), dir.path().join("in.wav")];
        write_samples(&files[1], &ramp(44_100)).unwrap();

        let err = build(Crop::build, "crop 0.7 0.3", &files).unwrap_err();
        assert!(matches!(err, SoundError::Range { line: 1, .. }), "{err:?}");
    }
}
