//! Transparent decompression of source objects, chosen by file extension.

use std::io::{self, Read};

/// A decompression codec for whole source objects.
pub trait CompressionCodec: Send + Sync {
    /// Decompress `data` fully into memory.
    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Human-readable name of this codec (for logging).
    fn name(&self) -> &'static str;
}

/// Gzip codec using flate2. Concatenated members are read as one stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl CompressionCodec for GzipCodec {
    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        flate2::read::MultiGzDecoder::new(data).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}

/// Zstandard codec using zstd.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

impl CompressionCodec for ZstdCodec {
    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        zstd::stream::Decoder::new(data)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

/// Pass-through codec for uncompressed objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl CompressionCodec for NoopCodec {
    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Pick the codec for an object key: `.gz` and `.zst` are decompressed,
/// anything else is read as is.
pub fn codec_for_path(path: &str) -> &'static dyn CompressionCodec {
    if path.ends_with(".gz") {
        &GzipCodec
    } else if path.ends_with(".zst") || path.ends_with(".zstd") {
        &ZstdCodec
    } else {
        &NoopCodec
    }
}
