//! FLV file writing
//!
//! The mirror of [`FlvFileReader`](crate::flv::FlvFileReader): emits the
//! 9-byte file header, the zero previous-tag-size word, then packed tags.

use std::io::Write;

use crate::error::Result;
use crate::flv::tag::FlvTag;

/// Streaming FLV tag writer over any `Write`
pub struct FlvFileWriter<W: Write> {
    inner: W,
    header_written: bool,
}

impl<W: Write> FlvFileWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            header_written: false,
        }
    }

    /// Write the file header. Called implicitly by the first `write_tag`
    /// with both flags set if not called explicitly.
    pub fn write_file_header(&mut self, has_audio: bool, has_video: bool) -> Result<()> {
        let flags = (u8::from(has_audio) << 2) | u8::from(has_video);
        let header: [u8; 13] = [
            b'F', b'L', b'V', 1, flags, 0, 0, 0, 9, // file header
            0, 0, 0, 0, // first previous-tag-size
        ];
        self.inner.write_all(&header)?;
        self.header_written = true;
        Ok(())
    }

    /// Pack and write one tag.
    pub fn write_tag(&mut self, tag: &FlvTag) -> Result<()> {
        if !self.header_written {
            self.write_file_header(true, true)?;
        }
        self.inner.write_all(&tag.pack())?;
        Ok(())
    }

    /// Write already-packed tag bytes.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        if !self.header_written {
            self.write_file_header(true, true)?;
        }
        self.inner.write_all(data)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
