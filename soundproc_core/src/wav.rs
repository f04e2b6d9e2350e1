//! Reader and writer for canonical mono 16-bit PCM WAV files.
//!
//! Only one layout is accepted: PCM, one channel, 44100 Hz, 16 bits per
//! sample. Chunks other than `fmt ` and `data` are skipped by their declared
//! size. Positions and lengths are always counted in samples.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Result, SoundError};

/// Sample rate every stream must use.
pub const SAMPLE_RATE: u32 = 44_100;
/// Channel count every stream must use.
pub const CHANNELS: u16 = 1;
/// Sample width every stream must use.
pub const BITS_PER_SAMPLE: u16 = 16;
/// Length of the canonical header written by [`WavWriter`].
pub const HEADER_LEN: usize = 44;

const PCM_FORMAT: u16 = 1;
const BYTES_PER_SAMPLE: u64 = (BITS_PER_SAMPLE / 8) as u64;
const FMT_CHUNK_LEN: u32 = 16;
// RIFF size field counts everything after itself, excluding the data payload.
const RIFF_OVERHEAD: u32 = HEADER_LEN as u32 - 8;

/// Format fields of a WAV file together with the size of its data chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavHeader {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Canonical header describing `data_size` bytes of payload.
    pub fn new(data_size: u32) -> Self {
        let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
        Self {
            audio_format: PCM_FORMAT,
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            byte_rate: SAMPLE_RATE * u32::from(block_align),
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
            data_size,
        }
    }

    /// Value of the RIFF chunk size field.
    pub fn file_size(&self) -> u32 {
        RIFF_OVERHEAD.saturating_add(self.data_size)
    }

    pub fn total_samples(&self) -> u64 {
        u64::from(self.data_size) / BYTES_PER_SAMPLE
    }

    /// Serialize into the 44-byte canonical layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(b"RIFF");
        bytes[4..8].copy_from_slice(&self.file_size().to_le_bytes());
        bytes[8..12].copy_from_slice(b"WAVE");
        bytes[12..16].copy_from_slice(b"fmt ");
        bytes[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        bytes[20..22].copy_from_slice(&self.audio_format.to_le_bytes());
        bytes[22..24].copy_from_slice(&self.channels.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        bytes[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        bytes[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        bytes[36..40].copy_from_slice(b"data");
        bytes[40..44].copy_from_slice(&self.data_size.to_le_bytes());
        bytes
    }

    fn from_fmt_chunk(fmt: &[u8; FMT_CHUNK_LEN as usize]) -> Self {
        let u16_at = |offset: usize| u16::from_le_bytes([fmt[offset], fmt[offset + 1]]);
        let u32_at = |offset: usize| {
            u32::from_le_bytes([
                fmt[offset],
                fmt[offset + 1],
                fmt[offset + 2],
                fmt[offset + 3],
            ])
        };

        Self {
            audio_format: u16_at(0),
            channels: u16_at(2),
            sample_rate: u32_at(4),
            byte_rate: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
            data_size: 0,
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.audio_format != PCM_FORMAT {
            return Err(SoundError::format(
                path,
                format!("audio format {} is not PCM", self.audio_format),
            ));
        }
        if self.channels != CHANNELS {
            return Err(SoundError::format(
                path,
                format!("{} channels, expected mono", self.channels),
            ));
        }
        if self.sample_rate != SAMPLE_RATE {
            return Err(SoundError::format(
                path,
                format!("sample rate {} Hz, expected {SAMPLE_RATE} Hz", self.sample_rate),
            ));
        }
        if self.bits_per_sample != BITS_PER_SAMPLE {
            return Err(SoundError::format(
                path,
                format!(
                    "{} bits per sample, expected {BITS_PER_SAMPLE}",
                    self.bits_per_sample
                ),
            ));
        }
        let expected = WavHeader::new(self.data_size);
        if self.block_align != expected.block_align {
            return Err(SoundError::format(
                path,
                format!("block align {}, expected {}", self.block_align, expected.block_align),
            ));
        }
        if self.byte_rate != expected.byte_rate {
            return Err(SoundError::format(
                path,
                format!("byte rate {}, expected {}", self.byte_rate, expected.byte_rate),
            ));
        }
        Ok(())
    }
}

/// Length and rate of a stream, independent of any open file handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub total_samples: u64,
    pub sample_rate: u32,
}

impl StreamInfo {
    pub fn new(total_samples: u64) -> Self {
        Self {
            total_samples,
            sample_rate: SAMPLE_RATE,
        }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.total_samples as f64 / f64::from(self.sample_rate)
    }

    /// Index of the sample at `seconds`, rounded down and clamped to the
    /// stream length.
    pub fn seconds_to_sample(&self, seconds: f64) -> u64 {
        let sample = (seconds * f64::from(self.sample_rate)).floor();
        if sample <= 0.0 {
            0
        } else {
            (sample as u64).min(self.total_samples)
        }
    }

    pub fn with_samples(self, total_samples: u64) -> Self {
        Self {
            total_samples,
            ..self
        }
    }
}

/// Sequential reader with sample-accurate seeking.
#[derive(Debug)]
pub struct WavReader {
    path: PathBuf,
    inner: BufReader<File>,
    header: WavHeader,
    data_start: u64,
    position: u64,
    scratch: Vec<u8>,
}

impl WavReader {
    /// Open `path`, validate its format and position at the first sample.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|err| SoundError::io(&path, err))?;
        let file_len = file
            .metadata()
            .map_err(|err| SoundError::io(&path, err))?
            .len();
        let mut inner = BufReader::new(file);

        let (header, data_start) = read_chunks(&mut inner, &path)?;

        let declared = u64::from(header.data_size);
        let available = file_len.saturating_sub(data_start);
        if available < declared {
            return Err(SoundError::Truncated {
                path,
                declared,
                available,
            });
        }

        debug!(
            "opened '{}' for reading ({} samples)",
            path.display(),
            header.total_samples()
        );

        Ok(Self {
            path,
            inner,
            header,
            data_start,
            position: 0,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo::new(self.total_samples())
    }

    pub fn total_samples(&self) -> u64 {
        self.header.total_samples()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.total_samples() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn duration(&self) -> f64 {
        self.info().duration()
    }

    pub fn seconds_to_sample(&self, seconds: f64) -> u64 {
        self.info().seconds_to_sample(seconds)
    }

    /// Fill `buf` with up to `buf.len()` samples and return how many were
    /// read. Returns `0` once the end of the data chunk is reached.
    pub fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        let count = (buf.len() as u64).min(self.remaining()) as usize;
        if count == 0 {
            return Ok(0);
        }

        self.scratch.resize(count * BYTES_PER_SAMPLE as usize, 0);
        if let Err(err) = self.inner.read_exact(&mut self.scratch) {
            if err.kind() == ErrorKind::UnexpectedEof {
                return Err(SoundError::Truncated {
                    path: self.path.clone(),
                    declared: u64::from(self.header.data_size),
                    available: self.position * BYTES_PER_SAMPLE,
                });
            }
            return Err(SoundError::io(&self.path, err));
        }

        for (sample, bytes) in buf.iter_mut().zip(self.scratch.chunks_exact(2)) {
            *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
        }
        self.position += count as u64;
        Ok(count)
    }

    /// Advance by up to `count` samples without reading them.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        let count = count.min(self.remaining());
        if count == 0 {
            return Ok(());
        }
        let offset = i64::try_from(count * BYTES_PER_SAMPLE)
            .map_err(|_| SoundError::format(&self.path, "seek offset out of range"))?;
        self.inner
            .seek_relative(offset)
            .map_err(|err| SoundError::io(&self.path, err))?;
        self.position += count;
        Ok(())
    }

    /// Move to absolute sample `target`, clamped to the end of the stream.
    pub fn skip_to(&mut self, target: u64) -> Result<()> {
        let target = target.min(self.total_samples());
        if target == self.position {
            return Ok(());
        }
        self.inner
            .seek(SeekFrom::Start(self.data_start + target * BYTES_PER_SAMPLE))
            .map_err(|err| SoundError::io(&self.path, err))?;
        self.position = target;
        Ok(())
    }

    /// Rewind to the first sample.
    pub fn reset(&mut self) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(self.data_start))
            .map_err(|err| SoundError::io(&self.path, err))?;
        self.position = 0;
        Ok(())
    }
}

/// Walk the RIFF chunk list, returning the validated header and the byte
/// offset of the first sample.
fn read_chunks<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<(WavHeader, u64)> {
    let mut riff = [0u8; 12];
    reader.read_exact(&mut riff).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => SoundError::format(path, "file too short for a RIFF header"),
        _ => SoundError::io(path, err),
    })?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(SoundError::format(path, "missing RIFF/WAVE signature"));
    }

    let mut header: Option<WavHeader> = None;
    loop {
        let mut chunk = [0u8; 8];
        match reader.read_exact(&mut chunk) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                return Err(SoundError::MissingDataChunk {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(SoundError::io(path, err)),
        }

        let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

        match &id {
            b"fmt " => {
                if size < FMT_CHUNK_LEN {
                    return Err(SoundError::format(
                        path,
                        format!("fmt chunk is {size} bytes, expected at least {FMT_CHUNK_LEN}"),
                    ));
                }
                let mut fmt = [0u8; FMT_CHUNK_LEN as usize];
                reader.read_exact(&mut fmt).map_err(|err| match err.kind() {
                    ErrorKind::UnexpectedEof => SoundError::format(path, "fmt chunk is truncated"),
                    _ => SoundError::io(path, err),
                })?;
                let parsed = WavHeader::from_fmt_chunk(&fmt);
                parsed.validate(path)?;
                header = Some(parsed);
                skip_bytes(reader, path, padded(size) - u64::from(FMT_CHUNK_LEN))?;
            }
            b"data" => {
                let mut header = header.ok_or_else(|| {
                    SoundError::format(path, "data chunk appears before fmt chunk")
                })?;
                header.data_size = size;
                let data_start = reader
                    .stream_position()
                    .map_err(|err| SoundError::io(path, err))?;
                return Ok((header, data_start));
            }
            _ => {
                debug!(
                    "skipping '{}' chunk ({size} bytes) in '{}'",
                    String::from_utf8_lossy(&id),
                    path.display()
                );
                skip_bytes(reader, path, padded(size))?;
            }
        }
    }
}

// RIFF chunks are word aligned; odd sizes carry one pad byte.
fn padded(size: u32) -> u64 {
    u64::from(size) + u64::from(size & 1)
}

fn skip_bytes<R: Seek>(reader: &mut R, path: &Path, count: u64) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let offset = i64::try_from(count)
        .map_err(|_| SoundError::format(path, "chunk size out of range"))?;
    reader
        .seek(SeekFrom::Current(offset))
        .map_err(|err| SoundError::io(path, err))?;
    Ok(())
}

/// Appending writer. The header written on creation is provisional; its size
/// fields are rewritten by [`WavWriter::close`], or on drop if the writer was
/// never closed explicitly.
#[derive(Debug)]
pub struct WavWriter {
    path: PathBuf,
    inner: Option<BufWriter<File>>,
    samples_written: u64,
    scratch: Vec<u8>,
}

impl WavWriter {
    /// Create (or truncate) `path` and write a provisional header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|err| SoundError::io(&path, err))?;
        let mut inner = BufWriter::new(file);
        inner
            .write_all(&WavHeader::new(0).to_bytes())
            .map_err(|err| SoundError::io(&path, err))?;

        debug!("opened '{}' for writing", path.display());

        Ok(Self {
            path,
            inner: Some(inner),
            samples_written: 0,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of samples written so far.
    pub fn position(&self) -> u64 {
        self.samples_written
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn write(&mut self, samples: &[i16]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.check_capacity(samples.len() as u64)?;

        self.scratch.clear();
        self.scratch
            .extend(samples.iter().flat_map(|sample| sample.to_le_bytes()));

        let inner = self.inner.as_mut().ok_or_else(|| SoundError::WriteAfterClose {
            path: self.path.clone(),
        })?;
        inner
            .write_all(&self.scratch)
            .map_err(|err| SoundError::io(&self.path, err))?;
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    /// Append `count` zero samples.
    pub fn write_silence(&mut self, count: u64) -> Result<()> {
        const BLOCK: usize = 4096;
        let silence = [0i16; BLOCK];
        let mut left = count;
        while left > 0 {
            let step = left.min(BLOCK as u64) as usize;
            self.write(&silence[..step])?;
            left -= step as u64;
        }
        Ok(())
    }

    /// Rewrite the header with the final sizes and flush to disk. Closing an
    /// already closed writer is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };

        let data_size = u32::try_from(self.samples_written * BYTES_PER_SAMPLE)
            .map_err(|_| SoundError::format(&self.path, "data exceeds the WAV size limit"))?;
        let header = WavHeader::new(data_size);

        let finalize = |inner: &mut BufWriter<File>| -> std::io::Result<()> {
            inner.seek(SeekFrom::Start(0))?;
            inner.write_all(&header.to_bytes())?;
            inner.flush()?;
            inner.get_ref().sync_all()
        };
        finalize(&mut inner).map_err(|err| SoundError::io(&self.path, err))?;

        debug!(
            "closed '{}' ({} samples)",
            self.path.display(),
            self.samples_written
        );
        Ok(())
    }

    fn check_capacity(&self, additional: u64) -> Result<()> {
        let bytes = (self.samples_written + additional) * BYTES_PER_SAMPLE;
        if bytes > u64::from(u32::MAX - RIFF_OVERHEAD) {
            return Err(SoundError::format(
                &self.path,
                "data exceeds the WAV size limit",
            ));
        }
        Ok(())
    }
}

impl Drop for WavWriter {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(err) = self.close() {
                warn!("failed to finalize '{}': {err}", self.path.display());
            }
        }
    }
}

/// Read only the header of `path`.
pub fn read_info(path: impl AsRef<Path>) -> Result<StreamInfo> {
    WavReader::open(path).map(|reader| reader.info())
}

/// Write `samples` as a complete file.
pub fn write_samples(path: impl AsRef<Path>, samples: &[i16]) -> Result<()> {
    let mut writer = WavWriter::create(path)?;
    writer.write(samples)?;
    writer.close()
}

/// Read every sample of `path`.
pub fn read_samples(path: impl AsRef<Path>) -> Result<Vec<i16>> {
    let mut reader = WavReader::open(path)?;
    let mut samples = vec![0i16; reader.total_samples() as usize];
    let read = reader.read(&mut samples)?;
    samples.truncate(read);
    Ok(samples)
}
