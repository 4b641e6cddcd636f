pub mod audio;
pub mod util;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("insufficient data: reference spans {needed} windows, but target only has {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("no paths provided to searcher")]
    SearcherMissingPaths,
    #[error("FFT error: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("serde_json error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        // This includes IO errors raised mid-stream, e.g. a truncated data chunk.
        Error::Decode(format!("WAV: {}", e))
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for Error {
    fn from(e: ffmpeg_next::Error) -> Self {
        Error::Decode(format!("FFmpeg: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
