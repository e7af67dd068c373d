//! RTMP to MPEG-TS remuxing
//!
//! Turns a stream of RTMP messages into a PAT/PMT prologue plus a sequence
//! of packed TS frames, each tagged with a `boundary` hint. The boundary is
//! the signal HLS segmentation keys on: it fires on the first frame a
//! decoder could start from, which means a key frame with the audio
//! configuration known and the audio cache drained.
//!
//! Video is rewritten from AVCC to Annex-B with an access-unit delimiter up
//! front and parameter sets re-inserted before IDR/IRAP slices. Audio is
//! re-framed from raw AAC to ADTS and batched in a small cache so TS
//! overhead stays reasonable at low audio bitrates.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::codec::aac::AudioSpecificConfig;
use crate::codec::avc::AvcDecoderConfig;
use crate::codec::hevc::HevcDecoderConfig;
use crate::codec::nalu::{self, AvcNaluType, HevcNaluType};
use crate::error::Error;
use crate::mpegts::{
    pack_frame, MpegtsFrame, PID_AUDIO, PID_VIDEO, STREAM_ID_AUDIO, STREAM_ID_VIDEO,
};
use crate::remux::filter::{FilterOp, Rtmp2MpegtsFilter};
use crate::rtmp::message::{RtmpMessage, CODEC_ID_AVC, CODEC_ID_HEVC, SOUND_FORMAT_AAC};

/// Flush the audio cache when a new audio frame is this far past its head
const AUDIO_CACHE_FLUSH_AUDIO_GAP: u64 = 150 * 90;
/// Flush the audio cache when a video frame is this far past its head
const AUDIO_CACHE_FLUSH_VIDEO_GAP: u64 = 300 * 90;

/// Receiver for the remuxer's output
pub trait Rtmp2MpegtsObserver {
    /// Delivered exactly once, before any `on_ts_packets`
    fn on_pat_pmt(&mut self, bytes: Bytes);
    /// One packed frame; `boundary` marks a safe segmentation point
    fn on_ts_packets(&mut self, bytes: Bytes, frame: &MpegtsFrame, boundary: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoCodec {
    Avc,
    Hevc,
}

/// Stateful RTMP → MPEG-TS remuxer for one stream
pub struct Rtmp2Mpegts {
    filter: Rtmp2MpegtsFilter,

    video_codec: Option<VideoCodec>,
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    video_cc: u8,
    video_out: BytesMut,

    asc: Option<AudioSpecificConfig>,
    audio_cc: u8,
    audio_cache: BytesMut,
    audio_cache_first_pts: Option<u64>,

    /// Set once the first boundary has fired; cleared only by `dispose`
    opened: bool,
    disposed: bool,
}

impl Default for Rtmp2Mpegts {
    fn default() -> Self {
        Self::new()
    }
}

impl Rtmp2Mpegts {
    pub fn new() -> Self {
        Self {
            filter: Rtmp2MpegtsFilter::new(),
            video_codec: None,
            vps: None,
            sps: None,
            pps: None,
            video_cc: 0,
            video_out: BytesMut::new(),
            asc: None,
            audio_cc: 0,
            audio_cache: BytesMut::new(),
            audio_cache_first_pts: None,
            opened: false,
            disposed: false,
        }
    }

    /// Feed one RTMP message. Parse failures are logged and the message
    /// dropped; the stream recovers at the next key frame.
    pub fn feed(&mut self, msg: RtmpMessage, obs: &mut dyn Rtmp2MpegtsObserver) {
        if self.disposed {
            return;
        }
        match self.filter.push(msg) {
            FilterOp::Buffered => {}
            FilterOp::Drained { pat_pmt, msgs } => {
                obs.on_pat_pmt(pat_pmt);
                for m in msgs {
                    self.remux(&m, obs);
                }
            }
            FilterOp::Pass(m) => self.remux(&m, obs),
        }
    }

    /// Final audio flush. Idempotent.
    pub fn dispose(&mut self, obs: &mut dyn Rtmp2MpegtsObserver) {
        if self.disposed {
            return;
        }
        self.flush_audio(obs);
        self.disposed = true;
    }

    fn remux(&mut self, msg: &RtmpMessage, obs: &mut dyn Rtmp2MpegtsObserver) {
        if msg.is_audio() {
            self.on_audio(msg, obs);
        } else if msg.is_video() {
            self.on_video(msg, obs);
        }
        // Metadata does not map to an elementary stream
    }

    fn video_params_cached(&self) -> bool {
        match self.video_codec {
            Some(VideoCodec::Avc) => self.sps.is_some() && self.pps.is_some(),
            Some(VideoCodec::Hevc) => {
                self.vps.is_some() && self.sps.is_some() && self.pps.is_some()
            }
            None => false,
        }
    }

    // ---- audio ----

    fn on_audio(&mut self, msg: &RtmpMessage, obs: &mut dyn Rtmp2MpegtsObserver) {
        let payload = &msg.payload;
        if payload.len() < 3 {
            warn!(len = payload.len(), "audio message too short, dropped");
            return;
        }
        if payload[0] >> 4 != SOUND_FORMAT_AAC {
            warn!(
                sound_format = payload[0] >> 4,
                "{}",
                Error::UnsupportedCodec("non-aac audio")
            );
            return;
        }

        if payload[1] == 0 {
            // Sequence header carries the AudioSpecificConfig
            match AudioSpecificConfig::parse(&payload[2..]) {
                Ok(asc) => self.asc = Some(asc),
                Err(e) => warn!("bad audio specific config: {e}"),
            }
            return;
        }

        let Some(asc) = self.asc.clone() else {
            warn!("{}", Error::PrematureData("audio frame before asc"));
            return;
        };

        let pts = u64::from(msg.timestamp_abs) * 90;
        if let Some(first) = self.audio_cache_first_pts {
            if !self.audio_cache.is_empty() && first + AUDIO_CACHE_FLUSH_AUDIO_GAP < pts {
                self.flush_audio(obs);
            }
        }
        if self.audio_cache.is_empty() {
            self.audio_cache_first_pts = Some(pts);
        }

        let body = &payload[2..];
        self.audio_cache
            .put_slice(&asc.pack_adts_header(body.len()));
        self.audio_cache.put_slice(body);
    }

    fn flush_audio(&mut self, obs: &mut dyn Rtmp2MpegtsObserver) {
        if self.audio_cache.is_empty() {
            return;
        }
        let pts = self.audio_cache_first_pts.take().unwrap_or(0);
        let boundary = !self.video_params_cached();

        let mut frame = MpegtsFrame {
            pid: PID_AUDIO,
            stream_id: STREAM_ID_AUDIO,
            cc: self.audio_cc,
            dts: pts,
            pts,
            key: false,
            raw: self.audio_cache.split().freeze(),
        };
        let packed = pack_frame(&mut frame);
        self.audio_cc = frame.cc;
        obs.on_ts_packets(packed, &frame, boundary);
    }

    // ---- video ----

    fn on_video(&mut self, msg: &RtmpMessage, obs: &mut dyn Rtmp2MpegtsObserver) {
        let payload = &msg.payload;
        if payload.len() < 5 {
            warn!(len = payload.len(), "video message too short, dropped");
            return;
        }
        let codec = match payload[0] & 0x0F {
            CODEC_ID_AVC => VideoCodec::Avc,
            CODEC_ID_HEVC => VideoCodec::Hevc,
            other => {
                warn!(codec_id = other, "{}", Error::UnsupportedCodec("non-avc/hevc video"));
                return;
            }
        };
        self.video_codec = Some(codec);

        match payload[1] {
            0 => self.on_video_seq_header(codec, msg),
            1 => self.on_video_frame(codec, msg, obs),
            2 => {} // end of sequence
            other => warn!(packet_type = other, "unknown video packet type, dropped"),
        }
    }

    fn on_video_seq_header(&mut self, codec: VideoCodec, msg: &RtmpMessage) {
        match codec {
            VideoCodec::Avc => match AvcDecoderConfig::parse_seq_header(msg.payload.clone()) {
                Ok(config) => {
                    self.sps = config.last_sps().cloned();
                    self.pps = config.last_pps().cloned();
                }
                Err(e) => warn!("bad avc seq header: {e}"),
            },
            VideoCodec::Hevc => match HevcDecoderConfig::parse_seq_header(msg.payload.clone()) {
                Ok(config) => {
                    self.vps = config.last_vps().cloned();
                    self.sps = config.last_sps().cloned();
                    self.pps = config.last_pps().cloned();
                }
                Err(e) => warn!("bad hevc seq header: {e}"),
            },
        }
    }

    fn on_video_frame(
        &mut self,
        codec: VideoCodec,
        msg: &RtmpMessage,
        obs: &mut dyn Rtmp2MpegtsObserver,
    ) {
        let payload = &msg.payload;
        let cts = sign_extend_24(
            (u32::from(payload[2]) << 16) | (u32::from(payload[3]) << 8) | u32::from(payload[4]),
        );

        let nalus = match nalu::split_avcc(&payload[5..]) {
            Ok(nalus) => nalus,
            Err(e) => {
                warn!("corrupt video payload: {e}");
                return;
            }
        };

        // Absorb inline parameter sets, drop AUDs, keep the rest
        let mut frame_nalus: Vec<&[u8]> = Vec::with_capacity(nalus.len());
        for nal in nalus {
            let b0 = nal[0];
            match codec {
                VideoCodec::Avc => match AvcNaluType::from_byte(b0) {
                    Some(AvcNaluType::Aud) => continue,
                    Some(AvcNaluType::Sps) => {
                        self.sps = Some(Bytes::copy_from_slice(nal));
                        continue;
                    }
                    Some(AvcNaluType::Pps) => {
                        self.pps = Some(Bytes::copy_from_slice(nal));
                        continue;
                    }
                    _ => {}
                },
                VideoCodec::Hevc => {
                    if HevcNaluType::is_aud(b0) {
                        continue;
                    }
                    match HevcNaluType::code(b0) {
                        32 => {
                            self.vps = Some(Bytes::copy_from_slice(nal));
                            continue;
                        }
                        33 => {
                            self.sps = Some(Bytes::copy_from_slice(nal));
                            continue;
                        }
                        34 => {
                            self.pps = Some(Bytes::copy_from_slice(nal));
                            continue;
                        }
                        _ => {}
                    }
                }
            }
            frame_nalus.push(nal);
        }

        if frame_nalus.is_empty() {
            return;
        }
        if !self.video_params_cached() {
            warn!("{}", Error::PrematureData("video frame before parameter sets"));
            return;
        }

        // Rebuild the access unit in Annex-B form
        self.video_out.clear();
        match codec {
            VideoCodec::Avc => {
                self.video_out.put_slice(&nalu::START_CODE_4);
                self.video_out.put_slice(&nalu::AUD_AVC);
            }
            VideoCodec::Hevc => {
                self.video_out.put_slice(&nalu::START_CODE_4);
                self.video_out.put_slice(&nalu::AUD_HEVC);
            }
        }

        let mut params_inserted = false;
        let mut first_after_aud = true;
        for nal in &frame_nalus {
            let is_key_nalu = match codec {
                VideoCodec::Avc => AvcNaluType::from_byte(nal[0]) == Some(AvcNaluType::Idr),
                VideoCodec::Hevc => HevcNaluType::is_irap(nal[0]),
            };
            if is_key_nalu && !params_inserted {
                for ps in [&self.vps, &self.sps, &self.pps].into_iter().flatten() {
                    self.video_out.put_slice(&nalu::START_CODE_4);
                    self.video_out.put_slice(ps);
                }
                params_inserted = true;
                first_after_aud = false;
            }
            if first_after_aud {
                self.video_out.put_slice(&nalu::START_CODE_4);
                first_after_aud = false;
            } else {
                self.video_out.put_slice(&nalu::START_CODE_3);
            }
            self.video_out.put_slice(nal);
        }

        let dts = u64::from(msg.timestamp_abs) * 90;
        let pts = add_cts(dts, cts);
        let key = payload[0] >> 4 == 1;

        // Keep audio from lagging an entire GOP behind video. The boundary
        // decision looks at the cache state before this flush: audio that
        // was just pushed out still counts as audio flowing.
        let audio_cache_was_empty = self.audio_cache.is_empty();
        if let Some(first) = self.audio_cache_first_pts {
            if !self.audio_cache.is_empty() && first + AUDIO_CACHE_FLUSH_VIDEO_GAP < dts {
                self.flush_audio(obs);
            }
        }

        let boundary = key && (self.asc.is_none() || !self.opened || !audio_cache_was_empty);
        if boundary {
            self.opened = true;
        }

        let mut frame = MpegtsFrame {
            pid: PID_VIDEO,
            stream_id: STREAM_ID_VIDEO,
            cc: self.video_cc,
            dts,
            pts,
            key,
            raw: self.video_out.split().freeze(),
        };
        let packed = pack_frame(&mut frame);
        self.video_cc = frame.cc;
        obs.on_ts_packets(packed, &frame, boundary);
    }
}

fn sign_extend_24(v: u32) -> i32 {
    if v & 0x80_0000 != 0 {
        (v | 0xFF00_0000) as i32
    } else {
        v as i32
    }
}

fn add_cts(dts: u64, cts_ms: i32) -> u64 {
    let shift = i64::from(cts_ms) * 90;
    if shift < 0 {
        dts.saturating_sub(shift.unsigned_abs())
    } else {
        dts.saturating_add(shift as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::aac::build_audio_seq_header;
    use crate::mpegts::TS_PACKET_SIZE;

    /// Collects remuxer output for assertions
    #[derive(Default)]
    pub(crate) struct Collector {
        pub pat_pmt: Option<Bytes>,
        /// (bytes, frame, boundary)
        pub frames: Vec<(Bytes, MpegtsFrame, bool)>,
    }

    impl Rtmp2MpegtsObserver for Collector {
        fn on_pat_pmt(&mut self, bytes: Bytes) {
            assert!(self.pat_pmt.is_none(), "pat/pmt delivered twice");
            self.pat_pmt = Some(bytes);
        }

        fn on_ts_packets(&mut self, bytes: Bytes, frame: &MpegtsFrame, boundary: bool) {
            self.frames.push((bytes, frame.clone(), boundary));
        }
    }

    pub(crate) fn avc_seq_header_msg(ts: u32) -> RtmpMessage {
        let sps: &[u8] = &[0x67, 0x42, 0x00, 0x1E, 0xF4, 0x10, 0x6C, 0x80];
        let pps: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
        let record = AvcDecoderConfig::build(sps, pps).unwrap();
        let mut payload = BytesMut::new();
        payload.put_slice(&[0x17, 0x00, 0x00, 0x00, 0x00]);
        payload.put_slice(&record);
        RtmpMessage::video(ts, payload.freeze())
    }

    pub(crate) fn avc_frame_msg(ts: u32, key: bool, body_len: usize) -> RtmpMessage {
        let mut payload = BytesMut::new();
        payload.put_slice(&[if key { 0x17 } else { 0x27 }, 0x01, 0x00, 0x00, 0x00]);
        let nal_type: u8 = if key { 0x65 } else { 0x41 };
        payload.put_u32(1 + body_len as u32);
        payload.put_u8(nal_type);
        payload.put_slice(&vec![0x5A; body_len]);
        RtmpMessage::video(ts, payload.freeze())
    }

    pub(crate) fn aac_seq_header_msg(ts: u32) -> RtmpMessage {
        RtmpMessage::audio(ts, build_audio_seq_header(&[0x11, 0x90]))
    }

    pub(crate) fn aac_frame_msg(ts: u32, body_len: usize) -> RtmpMessage {
        let mut payload = BytesMut::new();
        payload.put_slice(&[0xAF, 0x01]);
        payload.put_slice(&vec![0x21; body_len]);
        RtmpMessage::audio(ts, payload.freeze())
    }

    #[test]
    fn test_pat_pmt_once_before_frames() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(avc_frame_msg(0, true, 100), &mut obs);
        assert!(obs.pat_pmt.is_some());
        assert_eq!(obs.pat_pmt.as_ref().unwrap().len(), 2 * TS_PACKET_SIZE);
        assert_eq!(obs.frames.len(), 1);
    }

    #[test]
    fn test_first_key_frame_is_boundary() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(avc_frame_msg(0, true, 64), &mut obs);
        remux.feed(avc_frame_msg(40, false, 64), &mut obs);

        let (_, frame0, boundary0) = &obs.frames[0];
        assert!(frame0.key);
        assert!(*boundary0);
        let (_, frame1, boundary1) = &obs.frames[1];
        assert!(!frame1.key);
        assert!(!boundary1);
    }

    #[test]
    fn test_key_au_preceded_by_parameter_sets() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(avc_frame_msg(0, true, 64), &mut obs);

        let raw = &obs.frames[0].1.raw;
        let nalus = nalu::split_annex_b(raw).unwrap();
        // AUD, SPS, PPS, IDR
        assert_eq!(nalus.len(), 4);
        assert_eq!(AvcNaluType::from_byte(nalus[0][0]), Some(AvcNaluType::Aud));
        assert_eq!(AvcNaluType::from_byte(nalus[1][0]), Some(AvcNaluType::Sps));
        assert_eq!(AvcNaluType::from_byte(nalus[2][0]), Some(AvcNaluType::Pps));
        assert_eq!(AvcNaluType::from_byte(nalus[3][0]), Some(AvcNaluType::Idr));
    }

    #[test]
    fn test_inter_frame_has_aud_but_no_params() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(avc_frame_msg(0, true, 64), &mut obs);
        remux.feed(avc_frame_msg(40, false, 64), &mut obs);

        let raw = &obs.frames[1].1.raw;
        let nalus = nalu::split_annex_b(raw).unwrap();
        assert_eq!(nalus.len(), 2);
        assert_eq!(AvcNaluType::from_byte(nalus[0][0]), Some(AvcNaluType::Aud));
        assert_eq!(AvcNaluType::from_byte(nalus[1][0]), Some(AvcNaluType::Slice));
    }

    #[test]
    fn test_video_before_params_dropped_then_recovers() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        // No seq header: inter frame is dropped
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(avc_frame_msg(0, false, 64), &mut obs);
        assert!(obs.frames.is_empty());
        // Seq header then key frame recovers the stream
        remux.feed(avc_seq_header_msg(10), &mut obs);
        remux.feed(avc_frame_msg(40, true, 64), &mut obs);
        assert_eq!(obs.frames.len(), 1);
        assert!(obs.frames[0].2);
    }

    #[test]
    fn test_corrupt_avcc_length_dropped_then_recovers() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);

        // AVCC length overruns the remaining buffer
        let mut payload = BytesMut::new();
        payload.put_slice(&[0x17, 0x01, 0x00, 0x00, 0x00]);
        payload.put_u32(1000);
        payload.put_slice(&[0x65, 0x00, 0x00]);
        remux.feed(RtmpMessage::video(0, payload.freeze()), &mut obs);
        assert!(obs.frames.is_empty());

        remux.feed(avc_frame_msg(40, true, 64), &mut obs);
        assert_eq!(obs.frames.len(), 1);
        assert!(obs.frames[0].1.key);
    }

    #[test]
    fn test_audio_cache_flush_on_gap() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        // Audio-only: the admission filter drains after 16 buffered messages
        remux.feed(aac_seq_header_msg(0), &mut obs);
        for i in 0..15u32 {
            remux.feed(aac_frame_msg(i * 21, 32), &mut obs);
        }
        // Frames at 0..147ms flushed when 168ms crossed the 150ms gap
        assert_eq!(obs.frames.len(), 1);

        let (_, frame, boundary) = &obs.frames[0];
        assert_eq!(frame.pid, PID_AUDIO);
        assert_eq!(frame.dts, 0);
        // Audio-only stream: no video parameter sets, so audio segments
        assert!(*boundary);
        // Eight ADTS frames of 32 bytes payload each
        assert_eq!(frame.raw.len(), 8 * (32 + 7));
    }

    #[test]
    fn test_audio_flushed_before_video_gap() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(aac_frame_msg(0, 32), &mut obs);
        remux.feed(avc_frame_msg(400, true, 64), &mut obs);

        assert_eq!(obs.frames.len(), 2);
        assert_eq!(obs.frames[0].1.pid, PID_AUDIO);
        assert_eq!(obs.frames[1].1.pid, PID_VIDEO);
    }

    #[test]
    fn test_dispose_flushes_audio() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(aac_frame_msg(0, 32), &mut obs);
        assert!(obs.frames.is_empty());
        remux.dispose(&mut obs);
        assert_eq!(obs.frames.len(), 1);
        assert_eq!(obs.frames[0].1.pid, PID_AUDIO);
        // Idempotent
        remux.dispose(&mut obs);
        assert_eq!(obs.frames.len(), 1);
    }

    #[test]
    fn test_non_aac_audio_rejected() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        // MP3 sound format
        remux.feed(
            RtmpMessage::audio(0, Bytes::from_static(&[0x2F, 0x01, 0xAA])),
            &mut obs,
        );
        for _ in 0..20 {
            remux.feed(
                RtmpMessage::audio(0, Bytes::from_static(&[0x2F, 0x01, 0xAA])),
                &mut obs,
            );
        }
        assert!(obs.frames.is_empty());
    }

    #[test]
    fn test_cts_shifts_pts() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);

        let mut payload = BytesMut::new();
        payload.put_slice(&[0x17, 0x01, 0x00, 0x00, 0x28]); // cts = 40ms
        payload.put_u32(2);
        payload.put_slice(&[0x65, 0x00]);
        remux.feed(RtmpMessage::video(100, payload.freeze()), &mut obs);

        let frame = &obs.frames[0].1;
        assert_eq!(frame.dts, 9000);
        assert_eq!(frame.pts, 9000 + 3600);
    }

    #[test]
    fn test_cc_persists_across_frames() {
        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        remux.feed(avc_frame_msg(0, true, 500), &mut obs);
        remux.feed(avc_frame_msg(40, false, 500), &mut obs);

        let first_packets = obs.frames[0].0.len() / TS_PACKET_SIZE;
        // Second frame's first packet continues the counter
        let second = &obs.frames[1].0;
        assert_eq!(second[3] & 0x0F, (first_packets as u8) & 0x0F);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend_24(0x000028), 40);
        assert_eq!(sign_extend_24(0xFFFFFF), -1);
        assert_eq!(sign_extend_24(0xFFFF00), -256);
    }

    #[test]
    fn test_hevc_key_au_layout() {
        use crate::codec::nalu::HevcNaluType;

        const VPS: &[u8] = &[0x40, 0x01, 0x0C, 0x01];
        const SPS: &[u8] = &[
            0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x5D, 0xA0, 0x02, 0x80, 0x80, 0x2D, 0x17,
        ];
        const PPS: &[u8] = &[0x44, 0x01, 0xC1, 0x72];

        let record = HevcDecoderConfig::build(VPS, SPS, PPS).unwrap();
        let mut seq = BytesMut::new();
        seq.put_slice(&[0x1C, 0x00, 0x00, 0x00, 0x00]);
        seq.put_slice(&record);

        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(RtmpMessage::video(0, seq.freeze()), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);

        // IDR_W_RADL frame
        let mut frame = BytesMut::new();
        frame.put_slice(&[0x1C, 0x01, 0x00, 0x00, 0x00]);
        frame.put_u32(4);
        frame.put_slice(&[0x26, 0x01, 0xAF, 0x08]);
        remux.feed(RtmpMessage::video(0, frame.freeze()), &mut obs);

        assert_eq!(obs.frames.len(), 1);
        let (_, ts_frame, boundary) = &obs.frames[0];
        assert!(ts_frame.key);
        assert!(*boundary);

        let nalus = nalu::split_annex_b(&ts_frame.raw).unwrap();
        // AUD, VPS, SPS, PPS, IDR
        assert_eq!(nalus.len(), 5);
        assert!(HevcNaluType::is_aud(nalus[0][0]));
        assert_eq!(HevcNaluType::code(nalus[1][0]), 32);
        assert_eq!(HevcNaluType::code(nalus[2][0]), 33);
        assert_eq!(HevcNaluType::code(nalus[3][0]), 34);
        assert!(HevcNaluType::is_irap(nalus[4][0]));
    }

    #[test]
    fn test_dts_non_decreasing_per_pid_in_ts_bytes() {
        use crate::mpegts::{PesHeader, TsPacketHeader};
        use std::collections::HashMap;

        let mut remux = Rtmp2Mpegts::new();
        let mut obs = Collector::default();
        remux.feed(avc_seq_header_msg(0), &mut obs);
        remux.feed(aac_seq_header_msg(0), &mut obs);
        for ms in (0..4000u32).step_by(40) {
            remux.feed(aac_frame_msg(ms, 32), &mut obs);
            remux.feed(avc_frame_msg(ms, ms % 2000 == 0, 400), &mut obs);
        }
        remux.dispose(&mut obs);

        // Read DTS back out of the packed bytes, not the frame structs
        let mut last_dts: HashMap<u16, u64> = HashMap::new();
        for (bytes, _, _) in &obs.frames {
            let first = &bytes[..TS_PACKET_SIZE];
            let header = TsPacketHeader::parse(first).unwrap();
            assert!(header.pusi);
            let offset = header.payload_offset(first).unwrap();
            let (pes, _) = PesHeader::parse(&first[offset..]).unwrap();
            let dts = pes.dts_or_pts().unwrap();
            if let Some(prev) = last_dts.get(&header.pid) {
                assert!(dts >= *prev, "pid {} went backwards", header.pid);
            }
            last_dts.insert(header.pid, dts);
        }
        assert_eq!(last_dts.len(), 2);
    }
}
