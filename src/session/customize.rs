//! Custom-publisher session
//!
//! Lets an embedding application publish a stream without speaking RTMP on
//! a socket: it feeds [`AvPacket`]s and the session synthesizes the RTMP
//! message stream a network publisher would have produced, ready for the
//! group layer to fan out.

use bytes::Bytes;
use tracing::warn;

use crate::error::Result;
use crate::remux::avpacket::{AvPacket, AvPacket2Rtmp, AvPacket2RtmpObserver, VideoFormat};

/// Options for a custom publisher
#[derive(Debug, Clone, Copy, Default)]
pub struct PubSessionOption {
    /// NALU framing of incoming video payloads
    pub video_format: VideoFormat,
}

/// A publisher driven by the embedding application
pub struct CustomizePubSession {
    stream_name: String,
    option: PubSessionOption,
    remuxer: AvPacket2Rtmp,
    observer: Option<Box<dyn AvPacket2RtmpObserver>>,
    disposed: bool,
}

impl CustomizePubSession {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            option: PubSessionOption::default(),
            remuxer: AvPacket2Rtmp::new(),
            observer: None,
            disposed: false,
        }
    }

    /// Adjust options before the first packet.
    pub fn with_option(mut self, f: impl FnOnce(&mut PubSessionOption)) -> Self {
        f(&mut self.option);
        self
    }

    /// Where the synthesized RTMP messages go.
    pub fn set_observer(&mut self, observer: Box<dyn AvPacket2RtmpObserver>) {
        self.observer = Some(observer);
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn option(&self) -> PubSessionOption {
        self.option
    }

    /// Configure decoder parameters ahead of the first frames.
    pub fn init_with_av_config(
        &mut self,
        asc: Option<Bytes>,
        vps: Option<Bytes>,
        sps: Option<Bytes>,
        pps: Option<Bytes>,
    ) {
        self.remuxer.init_with_av_config(asc, vps, sps, pps);
    }

    pub fn feed_audio_specific_config(&mut self, asc: Bytes) {
        self.remuxer.feed_audio_specific_config(asc);
    }

    /// Feed one packet. Video packets without an explicit format take the
    /// session's configured one.
    pub fn feed_av_packet(&mut self, mut pkt: AvPacket) -> Result<()> {
        if self.disposed {
            warn!(stream = %self.stream_name, "packet after dispose, dropped");
            return Ok(());
        }
        let Some(observer) = self.observer.as_mut() else {
            warn!(stream = %self.stream_name, "no observer attached, packet dropped");
            return Ok(());
        };
        if pkt.video_format == VideoFormat::default() {
            pkt.video_format = self.option.video_format;
        }
        self.remuxer.feed_av_packet(&pkt, observer.as_mut())
    }

    /// End the session. Idempotent.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remux::avpacket::AvPacketPayloadType;
    use crate::rtmp::message::RtmpMessage;
    use std::sync::mpsc;

    struct ChannelSink(mpsc::Sender<RtmpMessage>);

    impl AvPacket2RtmpObserver for ChannelSink {
        fn on_rtmp_msg(&mut self, msg: RtmpMessage) {
            let _ = self.0.send(msg);
        }
    }

    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1E, 0xF4, 0x10, 0x6C, 0x80];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

    #[test]
    fn test_publish_flow() {
        let (tx, rx) = mpsc::channel();
        let mut session = CustomizePubSession::new("studio")
            .with_option(|opt| opt.video_format = VideoFormat::AnnexB);
        session.set_observer(Box::new(ChannelSink(tx)));
        session.init_with_av_config(
            Some(Bytes::from_static(&[0x11, 0x90])),
            None,
            Some(Bytes::from_static(SPS)),
            Some(Bytes::from_static(PPS)),
        );

        session
            .feed_av_packet(AvPacket::video(
                AvPacketPayloadType::Avc,
                0,
                None,
                Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88]),
                VideoFormat::AnnexB,
            ))
            .unwrap();
        session
            .feed_av_packet(AvPacket::aac(0, Bytes::from_static(&[0x21, 0x10])))
            .unwrap();

        let msgs: Vec<RtmpMessage> = rx.try_iter().collect();
        // Video seq header, video frame, audio seq header, audio frame
        assert_eq!(msgs.len(), 4);
        assert!(msgs[0].is_video_key_seq_header());
        assert!(msgs[1].is_video_key_nalu());
        assert!(msgs[2].is_aac_seq_header());
        assert!(msgs[3].is_audio());
    }

    #[test]
    fn test_dispose_drops_packets() {
        let (tx, rx) = mpsc::channel();
        let mut session = CustomizePubSession::new("studio");
        session.set_observer(Box::new(ChannelSink(tx)));
        session.feed_audio_specific_config(Bytes::from_static(&[0x11, 0x90]));
        session.dispose();
        session
            .feed_av_packet(AvPacket::aac(0, Bytes::from_static(&[0x21])))
            .unwrap();
        assert!(rx.try_iter().next().is_none());
        // Idempotent
        session.dispose();
    }

    #[test]
    fn test_without_observer_packets_dropped() {
        let mut session = CustomizePubSession::new("studio");
        session.feed_audio_specific_config(Bytes::from_static(&[0x11, 0x90]));
        assert!(session
            .feed_av_packet(AvPacket::aac(0, Bytes::from_static(&[0x21])))
            .is_ok());
    }
}
