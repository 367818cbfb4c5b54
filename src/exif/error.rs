use thiserror::Error;

/// Why embedding GPS metadata into an image failed.
///
/// On either variant no output buffer is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// The input is not an image container this crate can parse.
    #[error("could not decode image container: {0}")]
    DecodeFailed(String),

    /// The metadata or the re-serialized container could not be produced.
    #[error("could not encode image with GPS metadata: {0}")]
    EncodeFailed(String),
}
