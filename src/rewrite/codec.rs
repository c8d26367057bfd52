//! Content-Encoding codecs for buffered body rewriting.
//!
//! Bodies are decoded fully into memory, rewritten, then encoded again with
//! the same codec so that the `Content-Encoding` header stays truthful.

use std::io::{Read, Write};

use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use thiserror::Error;

/// Brotli internal buffer size, matching the size used for serving.
const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 6;
const BROTLI_LG_WINDOW: u32 = 22;

/// Failure while decoding or re-encoding a body.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode {encoding} body: {source}")]
    Decode {
        encoding: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {encoding} body: {source}")]
    Encode {
        encoding: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Codec selected from a response's `Content-Encoding` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    /// No encoding, or an explicit `identity`.
    Identity,
    Gzip,
    /// `deflate` is the zlib format (RFC 1950).
    Deflate,
    Brotli,
    /// `compress` or an unknown token. The body cannot be rewritten safely and
    /// is passed through untouched.
    Untouched(String),
}

impl Codec {
    /// Select a codec from the raw `Content-Encoding` value.
    pub fn from_header(value: Option<&str>) -> Self {
        let token = match value.map(str::trim) {
            None | Some("") => return Codec::Identity,
            Some(v) => v.to_ascii_lowercase(),
        };

        match token.as_str() {
            "identity" => Codec::Identity,
            "gzip" | "x-gzip" => Codec::Gzip,
            "deflate" => Codec::Deflate,
            "br" => Codec::Brotli,
            _ => Codec::Untouched(token),
        }
    }

    /// Name used in errors, logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Identity => "identity",
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
            Codec::Brotli => "br",
            Codec::Untouched(_) => "untouched",
        }
    }

    /// Whether bodies in this encoding can be decoded and rewritten.
    pub fn is_rewritable(&self) -> bool {
        !matches!(self, Codec::Untouched(_))
    }

    /// Decode a complete body.
    pub fn decode(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let encoding = self.name();
        let mut out = Vec::with_capacity(input.len() * 2);
        let result = match self {
            Codec::Identity | Codec::Untouched(_) => return Ok(input.to_vec()),
            Codec::Gzip => MultiGzDecoder::new(input).read_to_end(&mut out),
            Codec::Deflate => ZlibDecoder::new(input).read_to_end(&mut out),
            Codec::Brotli => {
                brotli::Decompressor::new(input, BROTLI_BUFFER_SIZE).read_to_end(&mut out)
            }
        };

        result.map_err(|source| CodecError::Decode { encoding, source })?;
        Ok(out)
    }

    /// Encode a complete body with this codec.
    pub fn encode(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let encoding = self.name();
        let wrap = |source| CodecError::Encode { encoding, source };

        match self {
            Codec::Identity | Codec::Untouched(_) => Ok(input.to_vec()),
            Codec::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(input).map_err(wrap)?;
                encoder.finish().map_err(wrap)
            }
            Codec::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(input).map_err(wrap)?;
                encoder.finish().map_err(wrap)
            }
            Codec::Brotli => {
                let mut encoder = brotli::CompressorWriter::new(
                    Vec::new(),
                    BROTLI_BUFFER_SIZE,
                    BROTLI_QUALITY,
                    BROTLI_LG_WINDOW,
                );
                encoder.write_all(input).map_err(wrap)?;
                // into_inner finishes the stream.
                Ok(encoder.into_inner())
            }
        }
    }
}
