//! Text-safe encoding for whole-file payloads embedded in protocol messages.
//!
//! Files travel inside JSON text frames, so raw bytes are wrapped in a
//! base64 representation. The encoding is self-describing only as opaque
//! text: it carries no filename, extension or content-type hints, and the
//! round trip is byte-exact for arbitrary binary content.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors produced while encoding or decoding payloads.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The input text is not a valid encoded payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] base64::DecodeError),

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode raw bytes into the wire representation.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode the wire representation back into raw bytes.
///
/// Fails with [`CodecError::MalformedPayload`] when the input is not valid
/// encoded text.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// Read a file from disk and encode its full contents.
pub async fn encode_file(path: impl AsRef<Path>) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(encode(&bytes))
}

/// Decode a payload and persist it at `path`, creating parent directories
/// as needed.
pub async fn write_decoded(text: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = decode(text)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_byte_exact() {
        let inputs: &[&[u8]] = &[
            b"",
            b"hello",
            &[0x00, 0xff, 0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a],
        ];
        for input in inputs {
            assert_eq!(decode(&encode(input)).unwrap(), *input);
        }
    }

    #[test]
    fn round_trip_survives_large_binary_content() {
        // A few megabytes of non-repeating bytes, as a stand-in for a video
        // container.
        let input: Vec<u8> = (0..3 * 1024 * 1024u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect();
        assert_eq!(decode(&encode(&input)).unwrap(), input);
    }

    #[test]
    fn decode_rejects_invalid_text() {
        assert!(matches!(
            decode("not @ valid % payload"),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("input.bin");
        let dst = dir.path().join("nested/output.bin");
        tokio::fs::write(&src, [1u8, 2, 3, 255]).await.unwrap();

        let encoded = encode_file(&src).await.unwrap();
        write_decoded(&encoded, &dst).await.unwrap();

        assert_eq!(tokio::fs::read(&dst).await.unwrap(), vec![1u8, 2, 3, 255]);
    }
}
