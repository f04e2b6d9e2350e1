//! Line-oriented edit scripts.
//!
//! Each non-blank, non-comment line is one command: a verb followed by
//! whitespace separated parameters. Parameters starting with `$` refer to
//! operand files by index, `$1` being the source file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Result, SoundError};

/// Starts a comment: a token beginning with it ends the line.
pub const COMMENT_MARKER: char = '#';
/// Prefix of a parameter that refers to an operand file.
pub const REFERENCE_MARKER: char = '$';
/// Time value meaning "through the end of the stream".
pub const OPEN_END: f64 = -1.0;

/// A single command parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    Literal(String),
    /// A `$n` reference resolved against the operand files.
    File { index: usize, path: PathBuf },
}

impl Param {
    /// The token as it should appear in diagnostics.
    pub fn display(&self) -> String {
        match self {
            Param::Literal(text) => text.clone(),
            Param::File { index, .. } => format!("{REFERENCE_MARKER}{index}"),
        }
    }
}

/// One command read from a script.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCommand {
    pub verb: String,
    pub params: Vec<Param>,
    /// 1-based line the command was read from.
    pub line: usize,
}

impl ParsedCommand {
    /// Literal parameter at `index`, or a parse error if it is a file
    /// reference. `None` when the parameter is absent.
    pub fn literal(&self, index: usize) -> Result<Option<&str>> {
        match self.params.get(index) {
            None => Ok(None),
            Some(Param::Literal(text)) => Ok(Some(text.as_str())),
            Some(param @ Param::File { .. }) => Err(SoundError::parse(
                self.line,
                format!(
                    "'{}' expects a number at position {}, found file reference '{}'",
                    self.verb,
                    index + 1,
                    param.display()
                ),
            )),
        }
    }

    /// Reject parameters past the first `max`.
    pub fn expect_at_most(&self, max: usize) -> Result<()> {
        if self.params.len() > max {
            return Err(SoundError::parse(
                self.line,
                format!(
                    "'{}' takes at most {max} parameter(s), got {}",
                    self.verb,
                    self.params.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Iterator over the commands of a script.
pub struct ScriptParser<'a, R> {
    reader: R,
    files: &'a [PathBuf],
    line: usize,
    buf: String,
}

impl<'a, R: BufRead> ScriptParser<'a, R> {
    /// `files` is the full operand list, destination first.
    pub fn new(reader: R, files: &'a [PathBuf]) -> Self {
        Self {
            reader,
            files,
            line: 0,
            buf: String::new(),
        }
    }

    fn parse_line(&self, text: &str) -> Result<Option<ParsedCommand>> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            return Ok(None);
        }

        let mut tokens = trimmed
            .split_whitespace()
            .take_while(|token| !token.starts_with(COMMENT_MARKER));
        let Some(verb) = tokens.next() else {
            return Ok(None);
        };

        let params = tokens
            .map(|token| {
                if token.starts_with(REFERENCE_MARKER) {
                    resolve_reference(token, self.files, self.line)
                } else {
                    Ok(Param::Literal(token.to_owned()))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ParsedCommand {
            verb: verb.to_owned(),
            params,
            line: self.line,
        }))
    }
}

impl<R: BufRead> Iterator for ScriptParser<'_, R> {
    type Item = Result<ParsedCommand>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line += 1,
                Err(err) => {
                    self.line += 1;
                    return Some(Err(SoundError::parse(
                        self.line,
                        format!("failed to read line: {err}"),
                    )));
                }
            }

            match self.parse_line(&self.buf) {
                Ok(Some(command)) => return Some(Ok(command)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Read every command of the script at `path`.
pub fn parse_script(path: impl AsRef<Path>, files: &[PathBuf]) -> Result<Vec<ParsedCommand>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| SoundError::io(path, err))?;
    ScriptParser::new(BufReader::new(file), files).collect()
}

/// Resolve a `$n` token to operand file `n`. Index 0, the destination, is
/// not addressable.
pub fn resolve_reference(token: &str, files: &[PathBuf], line: usize) -> Result<Param> {
    let digits = token.strip_prefix(REFERENCE_MARKER).ok_or_else(|| {
        SoundError::parse(
            line,
            format!(
                "expected a file reference starting with '{REFERENCE_MARKER}', found '{token}'"
            ),
        )
    })?;
    let index: usize = digits.parse().map_err(|_| {
        SoundError::parse(line, format!("invalid file reference '{token}'"))
    })?;

    let last = files.len().saturating_sub(1);
    if index < 1 || index > last {
        return Err(SoundError::range(
            line,
            format!(
                "file reference '{token}' out of range, \
                 expected {REFERENCE_MARKER}1 to {REFERENCE_MARKER}{last}"
            ),
        ));
    }

    Ok(Param::File {
        index,
        path: files[index].clone(),
    })
}

/// Parse a time in seconds. [`OPEN_END`] is accepted only when
/// `allow_open_end` is set.
pub fn parse_time(
    param: &str,
    max_duration: f64,
    allow_open_end: bool,
    line: usize,
) -> Result<f64> {
    let time: f64 = param
        .parse()
        .map_err(|_| SoundError::parse(line, format!("invalid time '{param}'")))?;

    if !time.is_finite() {
        return Err(SoundError::parse(line, format!("invalid time '{param}'")));
    }
    if time < 0.0 {
        if allow_open_end && time == OPEN_END {
            return Ok(time);
        }
        return Err(SoundError::range(
            line,
            format!("time '{param}' cannot be negative"),
        ));
    }
    if time > max_duration {
        return Err(SoundError::range(
            line,
            format!("time '{param}' exceeds stream duration of {max_duration} s"),
        ));
    }

    Ok(time)
}

/// Parse a multiplicative factor within `[min, max]`.
pub fn parse_factor(param: &str, min: f64, max: f64, line: usize) -> Result<f64> {
    let factor: f64 = param
        .parse()
        .map_err(|_| SoundError::parse(line, format!("invalid factor '{param}'")))?;

    if factor.is_nan() || factor < min || factor > max {
        return Err(SoundError::range(
            line,
            format!("factor '{param}' out of range, expected {min} to {max}"),
        ));
    }

    Ok(factor)
}
