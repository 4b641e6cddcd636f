use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// A mono stream of signed 16-bit PCM samples at a fixed sample rate.
///
/// Samples are consumed strictly in order; there is no rewind. A [SpectralReader](super::SpectralReader)
/// owns its source, so the source is released when the reader is dropped.
pub trait SampleSource {
    /// Sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Total number of frames in the stream, including frames already read.
    fn total_frames(&self) -> usize;

    /// Fills `buf` with the next `buf.len()` samples.
    ///
    /// Fails with [Error::Decode] if fewer samples remain or the underlying stream is corrupt.
    /// The source never pads a short read with silence.
    fn read_exact(&mut self, buf: &mut [i16]) -> Result<()>;
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn total_frames(&self) -> usize {
        (**self).total_frames()
    }

    fn read_exact(&mut self, buf: &mut [i16]) -> Result<()> {
        (**self).read_exact(buf)
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn total_frames(&self) -> usize {
        (**self).total_frames()
    }

    fn read_exact(&mut self, buf: &mut [i16]) -> Result<()> {
        (**self).read_exact(buf)
    }
}

/// Samples held in memory.
#[derive(Clone, Debug)]
pub struct MemorySource {
    samples: Vec<i16>,
    sample_rate: u32,
    cursor: usize,
}

impl MemorySource {
    pub fn new(samples: impl Into<Vec<i16>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            cursor: 0,
        }
    }

    /// Returns all samples, including the ones already read.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

impl SampleSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_frames(&self) -> usize {
        self.samples.len()
    }

    fn read_exact(&mut self, buf: &mut [i16]) -> Result<()> {
        let end = self.cursor + buf.len();
        if end > self.samples.len() {
            return Err(Error::Decode(format!(
                "requested {} samples at frame {}, but only {} remain",
                buf.len(),
                self.cursor,
                self.samples.len() - self.cursor
            )));
        }
        buf.copy_from_slice(&self.samples[self.cursor..end]);
        self.cursor = end;
        Ok(())
    }
}

/// A contiguous range of frames taken from another source.
///
/// This is how an intro clip is cut out of a longer recording, and how a target is limited to
/// the portion of it that is searched.
#[derive(Debug)]
pub struct Segment<S> {
    inner: S,
    frames: usize,
    consumed: usize,
}

impl<S: SampleSource> Segment<S> {
    /// Builds a segment that starts `start` frames into `inner` and runs for `frames` frames
    /// (or until the end of `inner` if `None`).
    ///
    /// The first `start` frames of `inner` are read and discarded here.
    pub fn new(mut inner: S, start: usize, frames: Option<usize>) -> Result<Self> {
        let total = inner.total_frames();
        if start > total {
            return Err(Error::InvalidParameter(format!(
                "segment start (frame {}) is past the end of the source ({} frames)",
                start, total
            )));
        }

        let mut scratch = vec![0i16; start.min(8192)];
        let mut skipped = 0;
        while skipped < start {
            let n = (start - skipped).min(scratch.len());
            inner.read_exact(&mut scratch[..n])?;
            skipped += n;
        }

        let available = total - start;
        let frames = frames.map_or(available, |f| f.min(available));

        Ok(Self {
            inner,
            frames,
            consumed: 0,
        })
    }

    /// Same as [Segment::new], with the range given in time units.
    pub fn from_time(inner: S, start: Duration, duration: Option<Duration>) -> Result<Self> {
        let sample_rate = f64::from(inner.sample_rate());
        let start = (start.as_secs_f64() * sample_rate) as usize;
        let frames = duration.map(|d| (d.as_secs_f64() * sample_rate) as usize);
        Self::new(inner, start, frames)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: SampleSource> SampleSource for Segment<S> {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_frames(&self) -> usize {
        self.frames
    }

    fn read_exact(&mut self, buf: &mut [i16]) -> Result<()> {
        if self.consumed + buf.len() > self.frames {
            return Err(Error::Decode(format!(
                "requested {} samples at frame {}, but the segment ends at frame {}",
                buf.len(),
                self.consumed,
                self.frames
            )));
        }
        self.inner.read_exact(buf)?;
        self.consumed += buf.len();
        Ok(())
    }
}

/// Reads 16-bit integer PCM from a WAV stream.
///
/// Multi-channel audio is downmixed to mono by averaging the channels of each frame.
pub struct WavSource<R: Read> {
    reader: hound::WavReader<R>,
    channels: usize,
}

impl WavSource<BufReader<File>> {
    /// Opens the WAV file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::open(path.as_ref())?;
        Self::new(BufReader::new(f))
    }
}

impl<R: Read> WavSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        let reader = hound::WavReader::new(reader)?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(Error::Decode(format!(
                "unsupported WAV format: {:?} {}-bit (expected 16-bit integer PCM)",
                spec.sample_format, spec.bits_per_sample
            )));
        }
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(Error::Decode(format!(
                "invalid WAV header: channels={} sample_rate={}",
                spec.channels, spec.sample_rate
            )));
        }

        tracing::trace!(
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            frames = reader.duration(),
            "opened WAV stream"
        );

        Ok(Self {
            channels: spec.channels as usize,
            reader,
        })
    }
}

impl<R: Read> SampleSource for WavSource<R> {
    fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }

    fn total_frames(&self) -> usize {
        self.reader.duration() as usize
    }

    fn read_exact(&mut self, buf: &mut [i16]) -> Result<()> {
        let channels = self.channels;
        let mut samples = self.reader.samples::<i16>();
        for out in buf.iter_mut() {
            let mut sum = 0i32;
            for _ in 0..channels {
                match samples.next() {
                    Some(sample) => sum += i32::from(sample?),
                    None => return Err(Error::Decode("unexpected end of WAV data".to_string())),
                }
            }
            *out = (sum / channels as i32) as i16;
        }
        Ok(())
    }
}

/// Opens an audio file as a [SampleSource].
///
/// WAV files are read directly at their native sample rate. With the `ffmpeg` feature, any
/// other media file is decoded and resampled to `sample_rate`.
pub fn open_file(path: impl AsRef<Path>, sample_rate: u32) -> Result<Box<dyn SampleSource>> {
    let path = path.as_ref();

    let mut header = [0u8; 16];
    let n = File::open(path)?.read(&mut header)?;
    if infer::audio::is_wav(&header[..n]) {
        return Ok(Box::new(WavSource::open(path)?));
    }

    open_media(path, sample_rate)
}

#[cfg(feature = "ffmpeg")]
fn open_media(path: &Path, sample_rate: u32) -> Result<Box<dyn SampleSource>> {
    Ok(Box::new(super::FfmpegSource::open(path, sample_rate)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_media(path: &Path, _sample_rate: u32) -> Result<Box<dyn SampleSource>> {
    Err(Error::Decode(format!(
        "{} is not a WAV file (build with the `ffmpeg` feature to decode other formats)",
        path.display()
    )))
}
