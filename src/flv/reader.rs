//! FLV file reading
//!
//! An FLV file is a 9-byte file header, a zero previous-tag-size word, then
//! tags until EOF. The reader validates the signature once and then hands
//! out tags one at a time; a clean EOF at a tag boundary ends the stream,
//! a partial tag is an error.

use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::flv::tag::{FlvTag, TAG_HEADER_SIZE};

/// Byte length of the FLV file header
pub const FILE_HEADER_SIZE: usize = 9;

/// Streaming FLV tag reader over any `Read`
pub struct FlvFileReader<R: Read> {
    inner: R,
    header_read: bool,
    /// Audio-present flag from the file header
    pub has_audio: bool,
    /// Video-present flag from the file header
    pub has_video: bool,
}

impl<R: Read> FlvFileReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header_read: false,
            has_audio: false,
            has_video: false,
        }
    }

    /// Read and validate the 9-byte file header plus the first
    /// previous-tag-size word.
    pub fn read_file_header(&mut self) -> Result<()> {
        let mut header = [0u8; FILE_HEADER_SIZE];
        self.inner.read_exact(&mut header)?;
        if &header[0..3] != b"FLV" {
            return Err(Error::ProtocolViolation("flv bad signature"));
        }
        if header[3] != 1 {
            return Err(Error::ProtocolViolation("flv unsupported version"));
        }
        self.has_audio = header[4] & 0x04 != 0;
        self.has_video = header[4] & 0x01 != 0;

        let data_offset = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
        // Some writers pad the header; skip anything beyond the standard 9 bytes
        if data_offset as usize > FILE_HEADER_SIZE {
            let mut skip = vec![0u8; data_offset as usize - FILE_HEADER_SIZE];
            self.inner.read_exact(&mut skip)?;
        }

        let mut prev = [0u8; 4];
        self.inner.read_exact(&mut prev)?;
        self.header_read = true;
        Ok(())
    }

    /// Read the next tag. `Ok(None)` on clean EOF.
    pub fn read_tag(&mut self) -> Result<Option<FlvTag>> {
        if !self.header_read {
            self.read_file_header()?;
        }

        let mut header = [0u8; TAG_HEADER_SIZE];
        if !read_exact_or_eof(&mut self.inner, &mut header)? {
            return Ok(None);
        }
        let (tag_type, data_size, timestamp) = FlvTag::parse_header(&header)?;

        let mut payload = vec![0u8; data_size];
        self.inner.read_exact(&mut payload)?;

        let mut prev = [0u8; 4];
        self.inner.read_exact(&mut prev)?;
        let prev_size = u32::from_be_bytes(prev);
        if prev_size as usize != TAG_HEADER_SIZE + data_size {
            return Err(Error::ProtocolViolation("flv previous tag size mismatch"));
        }

        Ok(Some(FlvTag {
            tag_type,
            timestamp,
            payload: Bytes::from(payload),
        }))
    }
}

/// Fill `buf` completely, or report a clean EOF if no bytes were available.
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::MalformedBitstream("flv truncated tag"));
        }
        filled += n;
    }
    Ok(true)
}
