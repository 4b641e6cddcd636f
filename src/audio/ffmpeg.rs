extern crate ffmpeg_next;

use std::path::Path;

use super::{MemorySource, SampleSource};
use crate::{Error, Result};

/// Thin wrapper around the native `FFmpeg` audio decoder.
struct Decoder {
    decoder: ffmpeg_next::codec::decoder::Audio,
}

impl Decoder {
    fn from_stream(stream: ffmpeg_next::format::stream::Stream) -> Result<Self> {
        let ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = ctx.decoder().audio()?;
        Ok(Self { decoder })
    }

    fn send_packet(&mut self, packet: &ffmpeg_next::packet::Packet) -> Result<()> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn send_eof(&mut self) -> Result<()> {
        Ok(self.decoder.send_eof()?)
    }

    fn receive_frame(&mut self, frame: &mut ffmpeg_next::frame::Audio) -> Result<()> {
        Ok(self.decoder.receive_frame(frame)?)
    }
}

/// Resamples decoded frames to mono S16 at a fixed rate and collects the samples.
struct Collector {
    resampler: ffmpeg_next::software::resampling::Context,
    frame_resampled: ffmpeg_next::frame::Audio,
    sample_rate: u32,
    samples: Vec<i16>,
}

impl Collector {
    const FORMAT: ffmpeg_next::format::Sample =
        ffmpeg_next::format::Sample::I16(ffmpeg_next::format::sample::Type::Packed);

    fn new(decoder: &Decoder, sample_rate: u32) -> Result<Self> {
        let resampler = decoder.decoder.resampler(
            Self::FORMAT,
            ffmpeg_next::ChannelLayout::MONO,
            sample_rate,
        )?;
        Ok(Self {
            resampler,
            frame_resampled: ffmpeg_next::frame::Audio::empty(),
            sample_rate,
            samples: Vec::new(),
        })
    }

    fn push(&mut self, frame: &ffmpeg_next::frame::Audio) -> Result<()> {
        let mut delay = match self.resampler.run(frame, &mut self.frame_resampled) {
            Ok(v) => v,
            // If resampling fails due to changed input, construct a new resampler for this
            // frame and swap out the old one.
            Err(ffmpeg_next::Error::InputChanged) => {
                let mut resampler = frame.resampler(
                    Self::FORMAT,
                    ffmpeg_next::ChannelLayout::MONO,
                    self.sample_rate,
                )?;
                let delay = resampler.run(frame, &mut self.frame_resampled)?;
                self.resampler = resampler;
                delay
            }
            Err(e) => return Err(e.into()),
        };

        loop {
            // Note that `data` is a fixed-size buffer. To get the _actual_ sample bytes, we
            // need the sample count and the number of bytes per S16 sample (one channel).
            let raw_samples = &self.frame_resampled.data(0)[..self.frame_resampled.samples() * 2];

            // SAFETY: The resampler was explicitly configured to return packed S16 samples.
            let (_, samples, _) = unsafe { raw_samples.align_to::<i16>() };
            self.samples.extend_from_slice(samples);

            if delay.is_none() {
                break;
            }
            delay = self.resampler.flush(&mut self.frame_resampled)?;
        }

        Ok(())
    }
}

/// Decodes the best audio stream of a media file (e.g., the soundtrack of a video) into mono
/// 16-bit samples at a fixed sample rate.
///
/// The whole stream is decoded up front and held in memory.
pub struct FfmpegSource {
    inner: MemorySource,
}

impl FfmpegSource {
    /// Decodes the file at `path`, resampling to `sample_rate`.
    pub fn open(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let span = tracing::span!(tracing::Level::TRACE, "ffmpeg_decode");
        let _enter = span.enter();

        let path = path.as_ref();
        ffmpeg_next::init()?;

        let mut ctx = ffmpeg_next::format::input(&path)?;
        let stream = ctx
            .streams()
            .best(ffmpeg_next::media::Type::Audio)
            .ok_or_else(|| Error::Decode(format!("no audio stream in {}", path.display())))?;
        let stream_idx = stream.index();

        let mut decoder = Decoder::from_stream(stream)?;
        let mut collector = Collector::new(&decoder, sample_rate)?;
        let mut frame = ffmpeg_next::frame::Audio::empty();

        tracing::debug!("starting audio decode for {}", path.display());

        let audio_packets = ctx
            .packets()
            .filter(|(s, _)| s.index() == stream_idx)
            .map(|(_, p)| p);

        for p in audio_packets {
            if p.pts().map_or(false, |pts| pts < 0) {
                // Skip packets with an invalid PTS. This can happen if, e.g., the video was
                // trimmed.
                // See: https://stackoverflow.com/a/41032346/845275
                continue;
            }

            decoder.send_packet(&p)?;
            while decoder.receive_frame(&mut frame).is_ok() {
                collector.push(&frame)?;
            }
        }

        decoder.send_eof()?;
        while decoder.receive_frame(&mut frame).is_ok() {
            collector.push(&frame)?;
        }

        tracing::debug!(
            samples = collector.samples.len(),
            sample_rate,
            "completed audio decode for {}",
            path.display()
        );

        Ok(Self {
            inner: MemorySource::new(collector.samples, sample_rate),
        })
    }
}

impl SampleSource for FfmpegSource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_frames(&self) -> usize {
        self.inner.total_frames()
    }

    fn read_exact(&mut self, buf: &mut [i16]) -> Result<()> {
        self.inner.read_exact(buf)
    }
}
