use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;

/// Formats the given [Duration] as "MM:SS.mmms"
pub fn format_time(t: Duration) -> String {
    let minutes = t.as_secs() / 60;
    let seconds = t.as_secs() % 60;
    let millis = t.subsec_millis();
    format!("{:02}:{:02}.{:03}s", minutes, seconds, millis)
}

/// Returns the time at which window `index` starts, for windows of `window_size` samples.
pub fn window_offset(index: usize, window_size: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(index as f64 * window_size as f64 / f64::from(sample_rate))
}

/// Checks if the given path points to a valid audio file.
///
/// If `full` is set to **false**, only the file header will be checked. This is a very cheap
/// operation, but it does not guarantee validity. If set to **true**, the WAV header is parsed
/// (or, with the `ffmpeg` feature, the container is checked for an audio stream). This is more
/// expensive, but much more accurate. No audio is decoded in either case.
pub fn is_valid_audio_file(path: impl AsRef<Path>, full: bool) -> bool {
    let path = path.as_ref();

    let mut buf = [0u8; 8192];
    let n = match std::fs::File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    let buf = &buf[..n];

    if !full {
        return infer::is_audio(buf) || (cfg!(feature = "ffmpeg") && infer::is_video(buf));
    }

    if infer::audio::is_wav(buf) {
        return crate::audio::WavSource::open(path).is_ok();
    }

    has_audio_stream(path)
}

#[cfg(feature = "ffmpeg")]
fn has_audio_stream(path: &Path) -> bool {
    if ffmpeg_next::init().is_err() {
        return false;
    }
    match ffmpeg_next::format::input(&path) {
        Ok(input) => input
            .streams()
            .any(|s| s.parameters().medium() == ffmpeg_next::util::media::Type::Audio),
        Err(_) => false,
    }
}

#[cfg(not(feature = "ffmpeg"))]
fn has_audio_stream(_path: &Path) -> bool {
    false
}

/// Expands the given paths into a sorted list of audio files.
///
/// Directories are walked recursively. Files that are passed in explicitly must be valid audio
/// files, while files found in directories are silently skipped if they are not.
pub fn find_audio_files(paths: &[PathBuf], full: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            walk_dir(path, full, &mut files)?;
        } else if is_valid_audio_file(path, full) {
            files.push(path.clone());
        } else {
            return Err(crate::Error::InvalidParameter(format!(
                "{} is not a valid audio file",
                path.display()
            )));
        }
    }

    files.sort();
    files.dedup();

    Ok(files)
}

fn walk_dir(dir: &Path, full: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(&path, full, files)?;
        } else if is_valid_audio_file(&path, full) {
            files.push(path);
        } else {
            tracing::trace!("skipping {}", path.display());
        }
    }
    Ok(())
}

/// Computes the MD5 hash of the first 8 KiB of a file (or all of it, if it is shorter).
pub(crate) fn compute_header_md5sum(path: impl AsRef<Path>) -> Result<String> {
    let mut buf = Vec::with_capacity(8192);
    let f = std::fs::File::open(path.as_ref())?;
    f.take(8192).read_to_end(&mut buf)?;
    let hash = format!("{:x}", md5::compute(&buf));
    Ok(hash)
}

/// Returns the underlying FFmpeg version integer.
#[cfg(feature = "ffmpeg")]
pub fn ffmpeg_version() -> u32 {
    ffmpeg_next::util::version()
}

/// Returns the underlying FFmpeg version string.
#[cfg(feature = "ffmpeg")]
pub fn ffmpeg_version_string() -> String {
    let version_int = ffmpeg_version();

    // Reference: https://github.com/FFmpeg/FFmpeg/blob/130d19bf2044ac76372d1b97ab87ab283c8b37f8/libavutil/version.h#L64
    format!(
        "{}.{}.{}",
        version_int >> 16,             // MAJOR
        (version_int & 0x00FF00) >> 8, // MINOR
        version_int & 0xFF             // MICRO
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_wav(path: &Path, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(Duration::from_millis(83_250)), "01:23.250s");
        assert_eq!(format_time(Duration::ZERO), "00:00.000s");
    }

    #[test]
    fn test_window_offset() {
        assert_eq!(window_offset(10, 2205, 22050), Duration::from_secs(1));
        assert_eq!(window_offset(0, 2048, 22050), Duration::ZERO);
        assert_eq!(window_offset(5, 2048, 0), Duration::ZERO);
    }

    #[test]
    fn test_find_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("season-1");
        std::fs::create_dir(&nested).unwrap();

        write_wav(&dir.path().join("b.wav"), &[0; 16]);
        write_wav(&nested.join("a.wav"), &[0; 16]);
        std::fs::write(dir.path().join("notes.txt"), "not audio").unwrap();

        let files = find_audio_files(&[dir.path().to_owned()], true).unwrap();
        assert_eq!(files, vec![dir.path().join("b.wav"), nested.join("a.wav")]);

        let files = find_audio_files(&[dir.path().to_owned()], false).unwrap();
        assert_eq!(files.len(), 2);

        let err = find_audio_files(&[dir.path().join("notes.txt")], false).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidParameter(_)));
    }

    #[test]
    fn test_is_valid_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        write_wav(&good, &[0; 16]);
        assert!(is_valid_audio_file(&good, true));
        assert!(is_valid_audio_file(&good, false));

        // A RIFF/WAVE signature passes the header check, but the WAV header does not parse.
        let broken = dir.path().join("broken.wav");
        std::fs::write(&broken, b"RIFF\x00\x00\x00\x00WAVEjunk").unwrap();
        assert!(is_valid_audio_file(&broken, false));
        assert!(!is_valid_audio_file(&broken, true));

        assert!(!is_valid_audio_file(dir.path().join("missing.wav"), true));
    }

    #[test]
    fn test_compute_header_md5sum_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            compute_header_md5sum(&path).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }
}
