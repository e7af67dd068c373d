//! FLV tag framing
//!
//! Each RTMP audio/video message body is exactly an FLV tag body; FLV adds
//! the per-tag header and a trailing previous-tag-size word:
//!
//! ```text
//! | Type(1) | DataSize(3 BE) | TS(3 BE) | TSExt(1) | StreamID(3)=0
//! | body (DataSize bytes) | PrevTagSize(4 BE) = 11 + DataSize |
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Byte length of the per-tag header
pub const TAG_HEADER_SIZE: usize = 11;
/// Byte length of the trailing previous-tag-size field
pub const PREV_TAG_SIZE_FIELD_SIZE: usize = 4;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::Script => 18,
        }
    }
}

/// Video frame type (upper 4 bits of the first video body byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Parsed FLV tag
#[derive(Debug, Clone)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Tag body (codec flag bytes included)
    pub payload: Bytes,
}

impl FlvTag {
    pub fn audio(timestamp: u32, payload: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            timestamp,
            payload,
        }
    }

    pub fn video(timestamp: u32, payload: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            timestamp,
            payload,
        }
    }

    pub fn script(payload: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Script,
            timestamp: 0,
            payload,
        }
    }

    /// Serialize header + body + previous-tag-size trailer.
    pub fn pack(&self) -> Bytes {
        let mut out =
            BytesMut::with_capacity(TAG_HEADER_SIZE + self.payload.len() + PREV_TAG_SIZE_FIELD_SIZE);
        out.put_u8(self.tag_type.as_byte());
        out.put_u8((self.payload.len() >> 16) as u8);
        out.put_u8((self.payload.len() >> 8) as u8);
        out.put_u8(self.payload.len() as u8);
        out.put_u8((self.timestamp >> 16) as u8);
        out.put_u8((self.timestamp >> 8) as u8);
        out.put_u8(self.timestamp as u8);
        out.put_u8((self.timestamp >> 24) as u8); // extension carries the high byte
        out.put_slice(&[0, 0, 0]); // stream id
        out.put_slice(&self.payload);
        out.put_u32((TAG_HEADER_SIZE + self.payload.len()) as u32);
        out.freeze()
    }

    /// Parse an 11-byte tag header. Returns `(tag_type, data_size, timestamp)`.
    pub fn parse_header(header: &[u8]) -> Result<(FlvTagType, usize, u32)> {
        if header.len() < TAG_HEADER_SIZE {
            return Err(Error::MalformedBitstream("flv tag header too short"));
        }
        let tag_type = FlvTagType::from_byte(header[0])
            .ok_or(Error::MalformedBitstream("flv unknown tag type"))?;
        let data_size = (usize::from(header[1]) << 16)
            | (usize::from(header[2]) << 8)
            | usize::from(header[3]);
        let timestamp = (u32::from(header[7]) << 24)
            | (u32::from(header[4]) << 16)
            | (u32::from(header[5]) << 8)
            | u32::from(header[6]);
        Ok((tag_type, data_size, timestamp))
    }

    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// For video tags, get the frame type
    pub fn video_frame_type(&self) -> Option<VideoFrameType> {
        if self.is_video() && !self.payload.is_empty() {
            VideoFrameType::from_byte(self.payload[0])
        } else {
            None
        }
    }

    /// Check if this is a video keyframe
    pub fn is_keyframe(&self) -> bool {
        self.video_frame_type()
            .map(|ft| ft.is_keyframe())
            .unwrap_or(false)
    }

    /// Check if this is an AVC or HEVC sequence header
    pub fn is_video_seq_header(&self) -> bool {
        self.is_video() && crate::rtmp::is_video_key_seq_header(&self.payload)
    }

    /// Check if this is an AAC sequence header
    pub fn is_aac_seq_header(&self) -> bool {
        self.is_audio() && crate::rtmp::is_aac_seq_header(&self.payload)
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let tag = FlvTag::video(0x01020304, Bytes::from_static(&[0x17, 0x01, 0xAB]));
        let packed = tag.pack();

        assert_eq!(packed.len(), 11 + 3 + 4);
        assert_eq!(packed[0], 9);
        assert_eq!(&packed[1..4], &[0x00, 0x00, 0x03]); // data size
        assert_eq!(&packed[4..7], &[0x02, 0x03, 0x04]); // ts low 24
        assert_eq!(packed[7], 0x01); // ts extension
        assert_eq!(&packed[8..11], &[0, 0, 0]); // stream id
        assert_eq!(&packed[11..14], &[0x17, 0x01, 0xAB]);
        assert_eq!(&packed[14..18], &(11u32 + 3).to_be_bytes());
    }

    #[test]
    fn test_pack_parse_header_round_trip() {
        let tag = FlvTag::audio(0x89ABCDEF, Bytes::from_static(&[0xAF, 0x01]));
        let packed = tag.pack();
        let (tag_type, size, ts) = FlvTag::parse_header(&packed[..11]).unwrap();
        assert_eq!(tag_type, FlvTagType::Audio);
        assert_eq!(size, 2);
        assert_eq!(ts, 0x89ABCDEF);
    }

    #[test]
    fn test_parse_header_rejects_unknown_type() {
        let mut header = [0u8; 11];
        header[0] = 7;
        assert!(FlvTag::parse_header(&header).is_err());
    }

    #[test]
    fn test_keyframe_detection() {
        let key = FlvTag::video(0, Bytes::from_static(&[0x17, 0x01]));
        assert!(key.is_keyframe());
        let inter = FlvTag::video(0, Bytes::from_static(&[0x27, 0x01]));
        assert!(!inter.is_keyframe());
        let audio = FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x01]));
        assert!(!audio.is_keyframe());
    }

    #[test]
    fn test_seq_header_predicates() {
        let avc = FlvTag::video(0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]));
        assert!(avc.is_video_seq_header());
        let hevc = FlvTag::video(0, Bytes::from_static(&[0x1C, 0x00, 0, 0, 0]));
        assert!(hevc.is_video_seq_header());
        let aac = FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]));
        assert!(aac.is_aac_seq_header());
    }

    #[test]
    fn test_tag_type_round_trip() {
        for t in [FlvTagType::Audio, FlvTagType::Video, FlvTagType::Script] {
            assert_eq!(FlvTagType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(FlvTagType::from_byte(0), None);
    }
}
