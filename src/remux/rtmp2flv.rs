//! RTMP ↔ FLV remuxing
//!
//! The thinnest remuxers in the pipeline: RTMP audio/video/data payloads
//! are FLV tag bodies already, so the work is re-framing plus the FLV file
//! header on the way out. Used by HTTP-FLV subscribers and FLV recording.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::flv::tag::{FlvTag, FlvTagType};
use crate::rtmp::message::RtmpMessage;
use crate::rtmp::metadata::strip_set_data_frame;

/// Receiver for [`Rtmp2Flv`] output
pub trait Rtmp2FlvObserver {
    /// The 13-byte FLV file header (including the zero previous-tag-size)
    fn on_flv_header(&mut self, bytes: Bytes);
    /// One packed FLV tag
    fn on_flv_tag(&mut self, bytes: Bytes);
}

/// RTMP message → FLV byte stream
#[derive(Debug, Default)]
pub struct Rtmp2Flv {
    header_sent: bool,
}

impl Rtmp2Flv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, msg: &RtmpMessage, obs: &mut dyn Rtmp2FlvObserver) {
        let tag = match msg.msg_type_id {
            8 => FlvTag::audio(msg.timestamp_abs, msg.payload.clone()),
            9 => FlvTag::video(msg.timestamp_abs, msg.payload.clone()),
            18 => {
                // Republished metadata keeps the bare onMetaData form
                FlvTag::script(strip_set_data_frame(&msg.payload))
            }
            _ => return,
        };

        if !self.header_sent {
            self.header_sent = true;
            obs.on_flv_header(Bytes::from_static(&[
                b'F', b'L', b'V', 1, 0x05, 0, 0, 0, 9, 0, 0, 0, 0,
            ]));
        }
        obs.on_flv_tag(tag.pack());
    }
}

/// FLV tag → RTMP message
#[derive(Debug)]
pub struct Flv2Rtmp {
    msg_stream_id: u32,
}

impl Default for Flv2Rtmp {
    fn default() -> Self {
        Self { msg_stream_id: 1 }
    }
}

impl Flv2Rtmp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_msg_stream_id(msg_stream_id: u32) -> Self {
        Self { msg_stream_id }
    }

    /// Convert one tag into the equivalent RTMP message.
    pub fn tag_to_message(&self, tag: &FlvTag) -> Result<RtmpMessage> {
        if tag.payload.is_empty() {
            return Err(Error::MalformedBitstream("empty flv tag body"));
        }
        let mut msg = match tag.tag_type {
            FlvTagType::Audio => RtmpMessage::audio(tag.timestamp, tag.payload.clone()),
            FlvTagType::Video => RtmpMessage::video(tag.timestamp, tag.payload.clone()),
            FlvTagType::Script => RtmpMessage::metadata(tag.payload.clone()),
        };
        msg.msg_stream_id = self.msg_stream_id;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::metadata::{build_metadata, wrap_set_data_frame};

    #[derive(Default)]
    struct Sink {
        header: Option<Bytes>,
        tags: Vec<Bytes>,
    }

    impl Rtmp2FlvObserver for Sink {
        fn on_flv_header(&mut self, bytes: Bytes) {
            assert!(self.header.is_none(), "header emitted twice");
            self.header = Some(bytes);
        }
        fn on_flv_tag(&mut self, bytes: Bytes) {
            self.tags.push(bytes);
        }
    }

    #[test]
    fn test_header_once_then_tags() {
        let mut remux = Rtmp2Flv::new();
        let mut sink = Sink::default();
        remux.feed(
            &RtmpMessage::video(0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0])),
            &mut sink,
        );
        remux.feed(
            &RtmpMessage::audio(10, Bytes::from_static(&[0xAF, 0x01, 0x21])),
            &mut sink,
        );
        assert_eq!(sink.header.as_deref().unwrap()[..3], *b"FLV");
        assert_eq!(sink.tags.len(), 2);
        assert_eq!(sink.tags[0][0], 9);
        assert_eq!(sink.tags[1][0], 8);
    }

    #[test]
    fn test_metadata_unwrapped() {
        let mut remux = Rtmp2Flv::new();
        let mut sink = Sink::default();
        let body = build_metadata(1280, 720, 10, 7);
        let wrapped = wrap_set_data_frame(&body);
        remux.feed(&RtmpMessage::metadata(wrapped), &mut sink);

        let tag = &sink.tags[0];
        assert_eq!(tag[0], 18);
        // Body after the 11-byte header is the bare onMetaData form
        assert_eq!(&tag[11..11 + body.len()], body.as_ref());
    }

    #[test]
    fn test_flv_to_rtmp() {
        let conv = Flv2Rtmp::with_msg_stream_id(7);
        let tag = FlvTag::video(1234, Bytes::from_static(&[0x27, 0x01, 0, 0, 0]));
        let msg = conv.tag_to_message(&tag).unwrap();
        assert!(msg.is_video());
        assert_eq!(msg.timestamp_abs, 1234);
        assert_eq!(msg.msg_stream_id, 7);
        assert_eq!(msg.payload, tag.payload);
    }

    #[test]
    fn test_round_trip_message_tag_message() {
        let mut remux = Rtmp2Flv::new();
        let mut sink = Sink::default();
        let original = RtmpMessage::audio(555, Bytes::from_static(&[0xAF, 0x01, 0x42, 0x43]));
        remux.feed(&original, &mut sink);

        // Parse the packed tag back
        let packed = &sink.tags[0];
        let (tag_type, size, ts) = FlvTag::parse_header(&packed[..11]).unwrap();
        let tag = FlvTag {
            tag_type,
            timestamp: ts,
            payload: Bytes::copy_from_slice(&packed[11..11 + size]),
        };
        let msg = Flv2Rtmp::new().tag_to_message(&tag).unwrap();
        assert_eq!(msg.timestamp_abs, 555);
        assert_eq!(msg.payload, original.payload);
    }

    #[test]
    fn test_empty_tag_rejected() {
        let tag = FlvTag::video(0, Bytes::new());
        assert!(Flv2Rtmp::new().tag_to_message(&tag).is_err());
    }
}
