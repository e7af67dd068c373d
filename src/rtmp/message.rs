//! RTMP message types and payload predicates
//!
//! Chunk assembly and the handshake live in the external socket layer; the
//! core consumes and produces whole messages. Audio/video payloads are
//! byte-identical to FLV tag bodies:
//!
//! ```text
//! Video | FrameType(4b) CodecId(4b) | AvcPacketType(1) | CTS(3, SI24) | body
//! Audio | SoundFormat(4b) Rate(2b) Size(1b) Type(1b) | AacPacketType(1) | body
//! ```

use bytes::Bytes;

/// Audio message type id
pub const MSG_TYPE_ID_AUDIO: u8 = 8;
/// Video message type id
pub const MSG_TYPE_ID_VIDEO: u8 = 9;
/// AMF0 data message type id (onMetaData)
pub const MSG_TYPE_ID_DATA_AMF0: u8 = 18;

/// Chunk stream ids the library assigns when it originates messages
pub const CSID_AMF: u32 = 5;
pub const CSID_AUDIO: u32 = 6;
pub const CSID_VIDEO: u32 = 7;

/// FLV/RTMP audio sound formats the pipeline recognizes
pub const SOUND_FORMAT_AAC: u8 = 10;
/// FLV/RTMP video codec ids the pipeline recognizes
pub const CODEC_ID_AVC: u8 = 7;
pub const CODEC_ID_HEVC: u8 = 12;

/// A complete RTMP message with absolute timestamp
#[derive(Debug, Clone)]
pub struct RtmpMessage {
    /// Chunk stream id the message arrived on (or will be sent on)
    pub csid: u32,
    /// Message type id (8=audio, 9=video, 18=data)
    pub msg_type_id: u8,
    /// Message stream id
    pub msg_stream_id: u32,
    /// Absolute timestamp in milliseconds
    pub timestamp_abs: u32,
    /// Message body; format depends on `msg_type_id`
    pub payload: Bytes,
}

impl RtmpMessage {
    /// Create an audio message with library-default csid/stream id
    pub fn audio(timestamp_abs: u32, payload: Bytes) -> Self {
        Self {
            csid: CSID_AUDIO,
            msg_type_id: MSG_TYPE_ID_AUDIO,
            msg_stream_id: 1,
            timestamp_abs,
            payload,
        }
    }

    /// Create a video message with library-default csid/stream id
    pub fn video(timestamp_abs: u32, payload: Bytes) -> Self {
        Self {
            csid: CSID_VIDEO,
            msg_type_id: MSG_TYPE_ID_VIDEO,
            msg_stream_id: 1,
            timestamp_abs,
            payload,
        }
    }

    /// Create an AMF0 data (metadata) message
    pub fn metadata(payload: Bytes) -> Self {
        Self {
            csid: CSID_AMF,
            msg_type_id: MSG_TYPE_ID_DATA_AMF0,
            msg_stream_id: 1,
            timestamp_abs: 0,
            payload,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.msg_type_id == MSG_TYPE_ID_AUDIO
    }

    pub fn is_video(&self) -> bool {
        self.msg_type_id == MSG_TYPE_ID_VIDEO
    }

    pub fn is_metadata(&self) -> bool {
        self.msg_type_id == MSG_TYPE_ID_DATA_AMF0
    }

    /// Sound format nibble for audio messages
    pub fn audio_codec_id(&self) -> Option<u8> {
        if self.is_audio() && !self.payload.is_empty() {
            Some(self.payload[0] >> 4)
        } else {
            None
        }
    }

    /// Codec id nibble for video messages
    pub fn video_codec_id(&self) -> Option<u8> {
        if self.is_video() && !self.payload.is_empty() {
            Some(self.payload[0] & 0x0F)
        } else {
            None
        }
    }

    pub fn is_aac_seq_header(&self) -> bool {
        self.is_audio() && is_aac_seq_header(&self.payload)
    }

    pub fn is_video_key_seq_header(&self) -> bool {
        self.is_video() && is_video_key_seq_header(&self.payload)
    }

    pub fn is_video_key_nalu(&self) -> bool {
        self.is_video() && is_video_key_nalu(&self.payload)
    }
}

/// AAC sequence header: sound format AAC, packet type 0
pub fn is_aac_seq_header(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[0] >> 4 == SOUND_FORMAT_AAC && payload[1] == 0
}

/// AVC keyframe sequence header: `17 00`
pub fn is_avc_key_seq_header(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[0] == 0x17 && payload[1] == 0x00
}

/// HEVC keyframe sequence header: `1C 00`
pub fn is_hevc_key_seq_header(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[0] == 0x1C && payload[1] == 0x00
}

/// Either codec's keyframe sequence header
pub fn is_video_key_seq_header(payload: &[u8]) -> bool {
    is_avc_key_seq_header(payload) || is_hevc_key_seq_header(payload)
}

/// Keyframe NALU message: frame type 1, packet type 1 (not a seq header)
pub fn is_video_key_nalu(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[0] >> 4 == 1 && payload[1] == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(is_avc_key_seq_header(&[0x17, 0x00, 0x01]));
        assert!(!is_avc_key_seq_header(&[0x17, 0x01]));
        assert!(is_hevc_key_seq_header(&[0x1C, 0x00]));
        assert!(!is_hevc_key_seq_header(&[0x2C, 0x00]));
        assert!(is_video_key_seq_header(&[0x17, 0x00]));
        assert!(is_video_key_seq_header(&[0x1C, 0x00]));
        assert!(is_video_key_nalu(&[0x17, 0x01]));
        assert!(is_video_key_nalu(&[0x1C, 0x01]));
        assert!(!is_video_key_nalu(&[0x27, 0x01]));
        assert!(is_aac_seq_header(&[0xAF, 0x00]));
        assert!(!is_aac_seq_header(&[0xAF, 0x01]));
        assert!(!is_aac_seq_header(&[0x2F, 0x00]));
    }

    #[test]
    fn test_predicates_short_payloads() {
        assert!(!is_avc_key_seq_header(&[0x17]));
        assert!(!is_aac_seq_header(&[]));
        assert!(!is_video_key_nalu(&[0x17]));
    }

    #[test]
    fn test_message_accessors() {
        let audio = RtmpMessage::audio(1000, Bytes::from_static(&[0xAF, 0x01, 0x21]));
        assert!(audio.is_audio());
        assert_eq!(audio.audio_codec_id(), Some(10));
        assert!(audio.video_codec_id().is_none());
        assert!(!audio.is_aac_seq_header());

        let video = RtmpMessage::video(2000, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]));
        assert!(video.is_video());
        assert_eq!(video.video_codec_id(), Some(7));
        assert!(video.is_video_key_seq_header());
        assert!(!video.is_video_key_nalu());

        let meta = RtmpMessage::metadata(Bytes::from_static(&[0x02]));
        assert!(meta.is_metadata());
        assert_eq!(meta.csid, CSID_AMF);
    }
}
