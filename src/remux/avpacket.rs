//! Container-neutral AV packets and their RTMP/FLV remuxers
//!
//! [`AvPacket`] is the normalized frame form at the API boundary: custom
//! publishers and the RTSP/RTP layer feed these instead of container
//! messages. [`AvPacket2Rtmp`] turns them into RTMP messages (emitting the
//! required sequence headers first), [`Rtmp2AvPacket`] goes the other way,
//! and [`AvPacket2Flv`] chains the forward path into FLV tag bytes.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::codec::avc::AvcDecoderConfig;
use crate::codec::hevc::HevcDecoderConfig;
use crate::codec::nalu::{self, AvcNaluType, HevcNaluType};
use crate::error::{Error, Result};
use crate::remux::rtmp2flv::{Rtmp2Flv, Rtmp2FlvObserver};
use crate::rtmp::message::{RtmpMessage, CODEC_ID_AVC, CODEC_ID_HEVC};

/// Codec carried by an [`AvPacket`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvPacketPayloadType {
    Avc,
    Hevc,
    Aac,
}

/// NALU framing of a video [`AvPacket`] payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoFormat {
    /// Start-code prefixed
    #[default]
    AnnexB,
    /// 4-byte length prefixed
    Avcc,
}

/// Container-neutral frame
#[derive(Debug, Clone)]
pub struct AvPacket {
    pub payload_type: AvPacketPayloadType,
    /// Decode timestamp in milliseconds
    pub timestamp: u64,
    /// Presentation timestamp in milliseconds; `None` means equal to DTS
    pub pts: Option<u64>,
    /// NALUs for video (framing per `video_format`), raw AAC for audio
    pub payload: Bytes,
    pub video_format: VideoFormat,
}

impl AvPacket {
    pub fn aac(timestamp: u64, payload: Bytes) -> Self {
        Self {
            payload_type: AvPacketPayloadType::Aac,
            timestamp,
            pts: None,
            payload,
            video_format: VideoFormat::default(),
        }
    }

    pub fn video(
        payload_type: AvPacketPayloadType,
        timestamp: u64,
        pts: Option<u64>,
        payload: Bytes,
        video_format: VideoFormat,
    ) -> Self {
        Self {
            payload_type,
            timestamp,
            pts,
            payload,
            video_format,
        }
    }

    /// Composition offset in milliseconds
    pub fn cts(&self) -> i64 {
        self.pts.map_or(0, |pts| pts as i64 - self.timestamp as i64)
    }
}

/// Receiver for [`AvPacket2Rtmp`] output
pub trait AvPacket2RtmpObserver {
    fn on_rtmp_msg(&mut self, msg: RtmpMessage);
}

/// AvPacket → RTMP message remuxer
///
/// Sequence headers are synthesized from the configured parameter sets and
/// emitted before the first frame of each elementary stream.
#[derive(Default)]
pub struct AvPacket2Rtmp {
    asc: Option<Bytes>,
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    audio_seq_sent: bool,
    video_seq_sent: bool,
}

impl AvPacket2Rtmp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure all decoder parameters at once (the RTSP-layer entry point).
    pub fn init_with_av_config(
        &mut self,
        asc: Option<Bytes>,
        vps: Option<Bytes>,
        sps: Option<Bytes>,
        pps: Option<Bytes>,
    ) {
        self.asc = asc;
        self.vps = vps;
        self.sps = sps;
        self.pps = pps;
    }

    pub fn feed_audio_specific_config(&mut self, asc: Bytes) {
        self.asc = Some(asc);
    }

    /// Remux one packet. Returns an error for packets that cannot be
    /// represented yet (missing configuration); the caller may retry after
    /// configuring.
    pub fn feed_av_packet(
        &mut self,
        pkt: &AvPacket,
        obs: &mut dyn AvPacket2RtmpObserver,
    ) -> Result<()> {
        match pkt.payload_type {
            AvPacketPayloadType::Aac => self.feed_audio(pkt, obs),
            AvPacketPayloadType::Avc | AvPacketPayloadType::Hevc => self.feed_video(pkt, obs),
        }
    }

    fn feed_audio(&mut self, pkt: &AvPacket, obs: &mut dyn AvPacket2RtmpObserver) -> Result<()> {
        if !self.audio_seq_sent {
            let asc = self
                .asc
                .as_ref()
                .ok_or(Error::PrematureData("aac frame before asc"))?;
            let mut seq = BytesMut::with_capacity(2 + asc.len());
            seq.put_slice(&[0xAF, 0x00]);
            seq.put_slice(asc);
            obs.on_rtmp_msg(RtmpMessage::audio(pkt.timestamp as u32, seq.freeze()));
            self.audio_seq_sent = true;
        }

        let mut payload = BytesMut::with_capacity(2 + pkt.payload.len());
        payload.put_slice(&[0xAF, 0x01]);
        payload.put_slice(&pkt.payload);
        obs.on_rtmp_msg(RtmpMessage::audio(pkt.timestamp as u32, payload.freeze()));
        Ok(())
    }

    fn feed_video(&mut self, pkt: &AvPacket, obs: &mut dyn AvPacket2RtmpObserver) -> Result<()> {
        let is_hevc = pkt.payload_type == AvPacketPayloadType::Hevc;
        let avcc = match pkt.video_format {
            VideoFormat::Avcc => pkt.payload.clone(),
            VideoFormat::AnnexB => nalu::annex_b_to_avcc(&pkt.payload)?,
        };

        // Absorb inline parameter sets and detect the key flag
        let mut key = false;
        nalu::walk_avcc(&avcc, |nal| {
            let b0 = nal[0];
            if is_hevc {
                match HevcNaluType::code(b0) {
                    32 => self.vps = Some(Bytes::copy_from_slice(nal)),
                    33 => self.sps = Some(Bytes::copy_from_slice(nal)),
                    34 => self.pps = Some(Bytes::copy_from_slice(nal)),
                    _ => key |= HevcNaluType::is_irap(b0),
                }
            } else {
                match AvcNaluType::from_byte(b0) {
                    Some(AvcNaluType::Sps) => self.sps = Some(Bytes::copy_from_slice(nal)),
                    Some(AvcNaluType::Pps) => self.pps = Some(Bytes::copy_from_slice(nal)),
                    Some(AvcNaluType::Idr) => key = true,
                    _ => {}
                }
            }
        })?;

        if !self.video_seq_sent {
            let record = self.build_video_config(is_hevc)?;
            let mut seq = BytesMut::with_capacity(5 + record.len());
            seq.put_u8(0x10 | if is_hevc { CODEC_ID_HEVC } else { CODEC_ID_AVC });
            seq.put_slice(&[0x00, 0x00, 0x00, 0x00]);
            seq.put_slice(&record);
            obs.on_rtmp_msg(RtmpMessage::video(pkt.timestamp as u32, seq.freeze()));
            self.video_seq_sent = true;
        }

        let frame_type: u8 = if key { 1 } else { 2 };
        let cts = pkt.cts().clamp(-0x80_0000, 0x7F_FFFF) as u32;
        let mut payload = BytesMut::with_capacity(5 + avcc.len());
        payload.put_u8((frame_type << 4) | if is_hevc { CODEC_ID_HEVC } else { CODEC_ID_AVC });
        payload.put_u8(0x01);
        payload.put_u8((cts >> 16) as u8);
        payload.put_u8((cts >> 8) as u8);
        payload.put_u8(cts as u8);
        payload.put_slice(&avcc);
        obs.on_rtmp_msg(RtmpMessage::video(pkt.timestamp as u32, payload.freeze()));
        Ok(())
    }

    fn build_video_config(&self, is_hevc: bool) -> Result<Bytes> {
        let sps = self
            .sps
            .as_ref()
            .ok_or(Error::PrematureData("video frame before sps"))?;
        let pps = self
            .pps
            .as_ref()
            .ok_or(Error::PrematureData("video frame before pps"))?;
        if is_hevc {
            let vps = self
                .vps
                .as_ref()
                .ok_or(Error::PrematureData("hevc frame before vps"))?;
            HevcDecoderConfig::build(vps, sps, pps)
        } else {
            AvcDecoderConfig::build(sps, pps)
        }
    }
}

/// Receiver for [`Rtmp2AvPacket`] output
pub trait Rtmp2AvPacketObserver {
    /// Decoder configuration changed; any field may be absent
    fn on_av_config(
        &mut self,
        asc: Option<Bytes>,
        vps: Option<Bytes>,
        sps: Option<Bytes>,
        pps: Option<Bytes>,
    );
    fn on_av_packet(&mut self, pkt: AvPacket);
}

/// RTMP message → AvPacket remuxer
#[derive(Default)]
pub struct Rtmp2AvPacket {
    asc: Option<Bytes>,
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl Rtmp2AvPacket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one message. Sequence headers surface as `on_av_config`; frames
    /// surface as AVCC packets.
    pub fn feed(&mut self, msg: &RtmpMessage, obs: &mut dyn Rtmp2AvPacketObserver) {
        if msg.is_audio() {
            self.on_audio(msg, obs);
        } else if msg.is_video() {
            self.on_video(msg, obs);
        }
    }

    fn emit_config(&self, obs: &mut dyn Rtmp2AvPacketObserver) {
        obs.on_av_config(
            self.asc.clone(),
            self.vps.clone(),
            self.sps.clone(),
            self.pps.clone(),
        );
    }

    fn on_audio(&mut self, msg: &RtmpMessage, obs: &mut dyn Rtmp2AvPacketObserver) {
        let payload = &msg.payload;
        if payload.len() < 2 || payload[0] >> 4 != 10 {
            warn!("{}", Error::UnsupportedCodec("non-aac audio"));
            return;
        }
        if payload[1] == 0 {
            self.asc = Some(msg.payload.slice(2..));
            self.emit_config(obs);
            return;
        }
        obs.on_av_packet(AvPacket::aac(
            u64::from(msg.timestamp_abs),
            msg.payload.slice(2..),
        ));
    }

    fn on_video(&mut self, msg: &RtmpMessage, obs: &mut dyn Rtmp2AvPacketObserver) {
        let payload = &msg.payload;
        if payload.len() < 5 {
            warn!("video message too short, dropped");
            return;
        }
        let payload_type = match payload[0] & 0x0F {
            CODEC_ID_AVC => AvPacketPayloadType::Avc,
            CODEC_ID_HEVC => AvPacketPayloadType::Hevc,
            _ => {
                warn!("{}", Error::UnsupportedCodec("non-avc/hevc video"));
                return;
            }
        };

        match payload[1] {
            0 => {
                match payload_type {
                    AvPacketPayloadType::Avc => {
                        match AvcDecoderConfig::parse_seq_header(msg.payload.clone()) {
                            Ok(c) => {
                                self.sps = c.last_sps().cloned();
                                self.pps = c.last_pps().cloned();
                            }
                            Err(e) => {
                                warn!("bad avc seq header: {e}");
                                return;
                            }
                        }
                    }
                    AvPacketPayloadType::Hevc => {
                        match HevcDecoderConfig::parse_seq_header(msg.payload.clone()) {
                            Ok(c) => {
                                self.vps = c.last_vps().cloned();
                                self.sps = c.last_sps().cloned();
                                self.pps = c.last_pps().cloned();
                            }
                            Err(e) => {
                                warn!("bad hevc seq header: {e}");
                                return;
                            }
                        }
                    }
                    AvPacketPayloadType::Aac => unreachable!(),
                }
                self.emit_config(obs);
            }
            1 => {
                let dts = u64::from(msg.timestamp_abs);
                let raw_cts = (u32::from(payload[2]) << 16)
                    | (u32::from(payload[3]) << 8)
                    | u32::from(payload[4]);
                let cts = if raw_cts & 0x80_0000 != 0 {
                    (raw_cts | 0xFF00_0000) as i32
                } else {
                    raw_cts as i32
                };
                let pts = dts.saturating_add_signed(i64::from(cts));
                obs.on_av_packet(AvPacket::video(
                    payload_type,
                    dts,
                    Some(pts),
                    msg.payload.slice(5..),
                    VideoFormat::Avcc,
                ));
            }
            _ => {}
        }
    }
}

/// Receiver for [`AvPacket2Flv`] output
pub trait AvPacket2FlvObserver {
    fn on_flv_header(&mut self, bytes: Bytes);
    fn on_flv_tag(&mut self, bytes: Bytes);
}

/// AvPacket → FLV remuxer; chains [`AvPacket2Rtmp`] into [`Rtmp2Flv`]
#[derive(Default)]
pub struct AvPacket2Flv {
    to_rtmp: AvPacket2Rtmp,
    to_flv: Rtmp2Flv,
}

impl AvPacket2Flv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_with_av_config(
        &mut self,
        asc: Option<Bytes>,
        vps: Option<Bytes>,
        sps: Option<Bytes>,
        pps: Option<Bytes>,
    ) {
        self.to_rtmp.init_with_av_config(asc, vps, sps, pps);
    }

    pub fn feed_av_packet(
        &mut self,
        pkt: &AvPacket,
        obs: &mut dyn AvPacket2FlvObserver,
    ) -> Result<()> {
        struct Bridge<'a> {
            to_flv: &'a mut Rtmp2Flv,
            obs: &'a mut dyn AvPacket2FlvObserver,
        }
        impl AvPacket2RtmpObserver for Bridge<'_> {
            fn on_rtmp_msg(&mut self, msg: RtmpMessage) {
                struct Fwd<'b>(&'b mut dyn AvPacket2FlvObserver);
                impl Rtmp2FlvObserver for Fwd<'_> {
                    fn on_flv_header(&mut self, bytes: Bytes) {
                        self.0.on_flv_header(bytes);
                    }
                    fn on_flv_tag(&mut self, bytes: Bytes) {
                        self.0.on_flv_tag(bytes);
                    }
                }
                self.to_flv.feed(&msg, &mut Fwd(self.obs));
            }
        }

        let mut bridge = Bridge {
            to_flv: &mut self.to_flv,
            obs,
        };
        self.to_rtmp.feed_av_packet(pkt, &mut bridge)
    }
}
