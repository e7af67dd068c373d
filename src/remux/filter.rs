//! Admission and timestamp filters in front of the MPEG-TS remuxer
//!
//! [`Rtmp2MpegtsFilter`] delays the stream head until the elementary-stream
//! layout is known, so the PAT/PMT emitted at the front of the TS stream
//! matches what the stream actually carries. [`TimestampRebaseFilter`]
//! optionally re-bases each PID's DTS to zero.

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::mpegts::{
    pack_pat, pack_pmt, MpegtsFrame, PmtStream, PID_AUDIO, PID_VIDEO, STREAM_TYPE_AAC,
    STREAM_TYPE_AVC, STREAM_TYPE_HEVC,
};
use crate::rtmp::message::{RtmpMessage, CODEC_ID_AVC, CODEC_ID_HEVC, SOUND_FORMAT_AAC};

/// Messages buffered before giving up on seeing both codec ids
pub const MAX_BUFFERED_MSGS: usize = 16;

/// What the filter decided about one incoming message
#[derive(Debug)]
pub enum FilterOp {
    /// Held back; nothing to do yet
    Buffered,
    /// Codec layout resolved: emit the PAT/PMT prologue, then replay the
    /// buffered messages in arrival order
    Drained {
        pat_pmt: Bytes,
        msgs: Vec<RtmpMessage>,
    },
    /// Filter already drained; process the message directly
    Pass(RtmpMessage),
}

/// Buffers the stream head until both codec ids are observed (or the buffer
/// limit is reached), then becomes a pass-through.
#[derive(Debug, Default)]
pub struct Rtmp2MpegtsFilter {
    buffer: Vec<RtmpMessage>,
    audio_codec_id: Option<u8>,
    video_codec_id: Option<u8>,
    done: bool,
}

impl Rtmp2MpegtsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: RtmpMessage) -> FilterOp {
        if self.done {
            return FilterOp::Pass(msg);
        }

        if let Some(id) = msg.audio_codec_id() {
            self.audio_codec_id.get_or_insert(id);
        }
        if let Some(id) = msg.video_codec_id() {
            self.video_codec_id.get_or_insert(id);
        }
        self.buffer.push(msg);

        let both_known = self.audio_codec_id.is_some() && self.video_codec_id.is_some();
        if !both_known && self.buffer.len() < MAX_BUFFERED_MSGS {
            return FilterOp::Buffered;
        }

        self.done = true;
        FilterOp::Drained {
            pat_pmt: self.build_pat_pmt(),
            msgs: std::mem::take(&mut self.buffer),
        }
    }

    fn build_pat_pmt(&self) -> Bytes {
        let mut streams = Vec::with_capacity(2);
        match self.video_codec_id {
            Some(CODEC_ID_AVC) => streams.push(PmtStream {
                pid: PID_VIDEO,
                stream_type: STREAM_TYPE_AVC,
            }),
            Some(CODEC_ID_HEVC) => streams.push(PmtStream {
                pid: PID_VIDEO,
                stream_type: STREAM_TYPE_HEVC,
            }),
            Some(other) => warn!(codec_id = other, "unsupported video codec, omitted from pmt"),
            None => {}
        }
        match self.audio_codec_id {
            Some(SOUND_FORMAT_AAC) => streams.push(PmtStream {
                pid: PID_AUDIO,
                stream_type: STREAM_TYPE_AAC,
            }),
            Some(other) => warn!(sound_format = other, "unsupported audio codec, omitted from pmt"),
            None => {}
        }

        let pat = pack_pat();
        let pmt = pack_pmt(&streams);
        let mut out = BytesMut::with_capacity(pat.len() + pmt.len());
        out.extend_from_slice(&pat);
        out.extend_from_slice(&pmt);
        out.freeze()
    }
}

/// Re-bases DTS per elementary stream to zero at the first frame.
///
/// A DTS below the captured base indicates an upstream timestamp anomaly;
/// it is clamped and logged, never fatal.
#[derive(Debug, Default)]
pub struct TimestampRebaseFilter {
    video_base: Option<u64>,
    audio_base: Option<u64>,
}

impl TimestampRebaseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `frame.dts`/`frame.pts` in place.
    pub fn rebase(&mut self, frame: &mut MpegtsFrame) {
        let base = if frame.pid == PID_AUDIO {
            *self.audio_base.get_or_insert(frame.dts)
        } else {
            *self.video_base.get_or_insert(frame.dts)
        };
        let cts = frame.pts.saturating_sub(frame.dts);
        if frame.dts < base {
            warn!(
                pid = frame.pid,
                dts = frame.dts,
                base,
                "dts below captured base, clamping to base"
            );
            frame.dts = base;
        }
        frame.dts -= base;
        frame.pts = frame.dts + cts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpegts::{parse_pmt, TS_PACKET_SIZE};

    fn video_msg(ts: u32, first: u8) -> RtmpMessage {
        RtmpMessage::video(ts, Bytes::from(vec![first, 0x01, 0, 0, 0]))
    }

    fn audio_msg(ts: u32) -> RtmpMessage {
        RtmpMessage::audio(ts, Bytes::from_static(&[0xAF, 0x01, 0x21]))
    }

    #[test]
    fn test_drains_when_both_codecs_seen() {
        let mut filter = Rtmp2MpegtsFilter::new();
        assert!(matches!(filter.push(video_msg(0, 0x17)), FilterOp::Buffered));
        match filter.push(audio_msg(0)) {
            FilterOp::Drained { pat_pmt, msgs } => {
                assert_eq!(pat_pmt.len(), 2 * TS_PACKET_SIZE);
                assert_eq!(msgs.len(), 2);
                assert!(msgs[0].is_video());
                assert!(msgs[1].is_audio());
                let streams = parse_pmt(&pat_pmt[TS_PACKET_SIZE..]).unwrap();
                assert_eq!(streams.len(), 2);
                assert_eq!(streams[0].stream_type, STREAM_TYPE_AVC);
                assert_eq!(streams[1].stream_type, STREAM_TYPE_AAC);
            }
            other => panic!("expected drain, got {:?}", other),
        }
        // Subsequent messages pass straight through
        assert!(matches!(filter.push(audio_msg(23)), FilterOp::Pass(_)));
    }

    #[test]
    fn test_drains_at_buffer_limit_audio_only() {
        let mut filter = Rtmp2MpegtsFilter::new();
        for i in 0..MAX_BUFFERED_MSGS - 1 {
            assert!(matches!(
                filter.push(audio_msg(i as u32 * 21)),
                FilterOp::Buffered
            ));
        }
        match filter.push(audio_msg(999)) {
            FilterOp::Drained { pat_pmt, msgs } => {
                assert_eq!(msgs.len(), MAX_BUFFERED_MSGS);
                let streams = parse_pmt(&pat_pmt[TS_PACKET_SIZE..]).unwrap();
                assert_eq!(streams.len(), 1);
                assert_eq!(streams[0].stream_type, STREAM_TYPE_AAC);
                assert_eq!(streams[0].pid, PID_AUDIO);
            }
            other => panic!("expected drain, got {:?}", other),
        }
    }

    #[test]
    fn test_hevc_pmt() {
        let mut filter = Rtmp2MpegtsFilter::new();
        filter.push(video_msg(0, 0x1C));
        match filter.push(audio_msg(0)) {
            FilterOp::Drained { pat_pmt, .. } => {
                let streams = parse_pmt(&pat_pmt[TS_PACKET_SIZE..]).unwrap();
                assert_eq!(streams[0].stream_type, STREAM_TYPE_HEVC);
            }
            other => panic!("expected drain, got {:?}", other),
        }
    }

    #[test]
    fn test_rebase_to_zero() {
        let mut f = TimestampRebaseFilter::new();
        let mut frame = MpegtsFrame {
            pid: PID_VIDEO,
            stream_id: 0xE0,
            cc: 0,
            dts: 900_000,
            pts: 903_600,
            key: true,
            raw: Bytes::new(),
        };
        f.rebase(&mut frame);
        assert_eq!(frame.dts, 0);
        assert_eq!(frame.pts, 3600);

        let mut frame2 = MpegtsFrame { dts: 990_000, pts: 990_000, ..frame.clone() };
        f.rebase(&mut frame2);
        assert_eq!(frame2.dts, 90_000);
    }

    #[test]
    fn test_rebase_per_pid() {
        let mut f = TimestampRebaseFilter::new();
        let mut v = MpegtsFrame {
            pid: PID_VIDEO,
            stream_id: 0xE0,
            cc: 0,
            dts: 1000,
            pts: 1000,
            key: false,
            raw: Bytes::new(),
        };
        let mut a = MpegtsFrame { pid: PID_AUDIO, dts: 5000, pts: 5000, ..v.clone() };
        f.rebase(&mut v);
        f.rebase(&mut a);
        assert_eq!(v.dts, 0);
        assert_eq!(a.dts, 0);
    }

    #[test]
    fn test_rebase_clamps_below_base() {
        let mut f = TimestampRebaseFilter::new();
        let mut first = MpegtsFrame {
            pid: PID_VIDEO,
            stream_id: 0xE0,
            cc: 0,
            dts: 10_000,
            pts: 10_000,
            key: false,
            raw: Bytes::new(),
        };
        f.rebase(&mut first);
        let mut early = MpegtsFrame { dts: 9_000, pts: 9_000, ..first.clone() };
        f.rebase(&mut early);
        assert_eq!(early.dts, 0);
    }
}
