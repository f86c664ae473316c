//! Content-encoding classification, gzip decoding and content digests.

use std::io;

use async_compression::tokio::bufread::GzipDecoder;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

/// Returns `true` if an object is gzip-compressed, by header or by name.
///
/// The `.gz` suffix counts even when the object carries no content-encoding.
pub(crate) fn is_compressed(content_encoding: Option<&str>, name: &str) -> bool {
    content_encoding == Some("gzip") || name.ends_with(".gz")
}

/// Decompresses a complete gzip payload, including concatenated members.
pub(crate) async fn gunzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzipDecoder::new(data);
    decoder.multiple_members(true);

    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).await?;
    Ok(decoded)
}

/// Uppercase hex MD5 of the given bytes.
pub(crate) fn md5_hex(data: &[u8]) -> String {
    format!("{:X}", Md5::digest(data))
}
