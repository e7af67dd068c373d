//! Silent-audio synthesis for video-only ingests
//!
//! HLS players and the MPEG-TS remuxer behave much better with two
//! elementary streams. For a publisher that sends no audio, this filter
//! fabricates an AAC-LC 48 kHz stereo track of encoder-silence frames.
//!
//! The filter starts in an analysis stage, buffering everything until real
//! audio shows up (pass-through from then on) or until `wait_audio_ms` of
//! video timestamps have elapsed (dummy generation from then on). Silent
//! frame timestamps advance by the rotation {22, 21, 21} ms, averaging the
//! true AAC frame duration of 1024/48000 s.

use bytes::Bytes;
use tracing::debug;

use crate::rtmp::message::RtmpMessage;

/// Default analysis window before declaring a stream video-only
pub const DEFAULT_WAIT_AUDIO_MS: u32 = 300;

/// ASC payload of the synthesized sequence header: AAC-LC, 48 kHz, stereo
const DUMMY_SEQ_HEADER: [u8; 4] = [0xAF, 0x00, 0x11, 0x90];
/// One silent AAC-LC frame, ready-prefixed with the RTMP audio flag bytes
const DUMMY_FRAME: [u8; 8] = [0xAF, 0x01, 0x21, 0x10, 0x04, 0x60, 0x8C, 0x1C];
/// Timestamp deltas cycling to an average of 21.33 ms
const TS_ROTATION: [u32; 3] = [22, 21, 21];

/// Receiver for the filter's (possibly augmented) message stream
pub trait DummyAudioObserver {
    fn on_rtmp_msg(&mut self, msg: RtmpMessage);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Analysis,
    Normal,
    Dummy,
}

/// Inserts silent AAC frames into a video-only RTMP stream
pub struct DummyAudioFilter {
    stage: Stage,
    wait_audio_ms: u32,
    buffered: Vec<RtmpMessage>,
    first_video_ts: Option<u32>,
    /// Timestamp of the next silent frame to emit
    next_audio_ts: Option<u32>,
    rotation_idx: usize,
    seq_header_sent: bool,
}

impl DummyAudioFilter {
    pub fn new(wait_audio_ms: u32) -> Self {
        Self {
            stage: Stage::Analysis,
            wait_audio_ms,
            buffered: Vec::new(),
            first_video_ts: None,
            next_audio_ts: None,
            rotation_idx: 0,
            seq_header_sent: false,
        }
    }

    pub fn feed(&mut self, msg: RtmpMessage, obs: &mut dyn DummyAudioObserver) {
        match self.stage {
            Stage::Analysis => self.feed_analysis(msg, obs),
            Stage::Normal => obs.on_rtmp_msg(msg),
            Stage::Dummy => self.feed_dummy(msg, obs),
        }
    }

    fn feed_analysis(&mut self, msg: RtmpMessage, obs: &mut dyn DummyAudioObserver) {
        if msg.is_audio() {
            debug!("real audio present, passing through");
            self.stage = Stage::Normal;
            for m in self.buffered.drain(..) {
                obs.on_rtmp_msg(m);
            }
            obs.on_rtmp_msg(msg);
            return;
        }

        if msg.is_video() {
            let first = *self.first_video_ts.get_or_insert(msg.timestamp_abs);
            if msg.timestamp_abs.wrapping_sub(first) >= self.wait_audio_ms {
                debug!(
                    wait_audio_ms = self.wait_audio_ms,
                    "no audio observed, synthesizing silence"
                );
                self.stage = Stage::Dummy;
                let buffered: Vec<RtmpMessage> = self.buffered.drain(..).collect();
                for m in buffered {
                    self.feed_dummy(m, obs);
                }
                self.feed_dummy(msg, obs);
                return;
            }
        }
        self.buffered.push(msg);
    }

    fn feed_dummy(&mut self, msg: RtmpMessage, obs: &mut dyn DummyAudioObserver) {
        if msg.is_audio() {
            // The real and synthesized configurations may differ; late audio
            // cannot be spliced in safely.
            debug!("dropping late real audio in dummy stage");
            return;
        }
        if !msg.is_video() {
            obs.on_rtmp_msg(msg);
            return;
        }

        if msg.is_video_key_seq_header() {
            if !self.seq_header_sent {
                self.seq_header_sent = true;
                obs.on_rtmp_msg(RtmpMessage::audio(
                    msg.timestamp_abs,
                    Bytes::from_static(&DUMMY_SEQ_HEADER),
                ));
            }
            obs.on_rtmp_msg(msg);
            return;
        }

        let video_ts = msg.timestamp_abs;
        let mut audio_ts = *self.next_audio_ts.get_or_insert(video_ts);
        while audio_ts <= video_ts {
            obs.on_rtmp_msg(RtmpMessage::audio(
                audio_ts,
                Bytes::from_static(&DUMMY_FRAME),
            ));
            audio_ts += TS_ROTATION[self.rotation_idx];
            self.rotation_idx = (self.rotation_idx + 1) % TS_ROTATION.len();
        }
        self.next_audio_ts = Some(audio_ts);
        obs.on_rtmp_msg(msg);
    }
}

impl Default for DummyAudioFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_AUDIO_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sink {
        msgs: Vec<RtmpMessage>,
    }

    impl DummyAudioObserver for Sink {
        fn on_rtmp_msg(&mut self, msg: RtmpMessage) {
            self.msgs.push(msg);
        }
    }

    fn video_seq_header(ts: u32) -> RtmpMessage {
        RtmpMessage::video(ts, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]))
    }

    fn video_frame(ts: u32) -> RtmpMessage {
        RtmpMessage::video(ts, Bytes::from_static(&[0x27, 0x01, 0, 0, 0, 0x41]))
    }

    fn audio_frame(ts: u32) -> RtmpMessage {
        RtmpMessage::audio(ts, Bytes::from_static(&[0xAF, 0x01, 0x21]))
    }

    #[test]
    fn test_real_audio_passes_through() {
        let mut filter = DummyAudioFilter::new(300);
        let mut sink = Sink::default();
        filter.feed(video_seq_header(0), &mut sink);
        filter.feed(video_frame(0), &mut sink);
        filter.feed(audio_frame(5), &mut sink);
        // Buffered video drained in order, then the audio
        assert_eq!(sink.msgs.len(), 3);
        assert!(sink.msgs[0].is_video());
        assert!(sink.msgs[1].is_video());
        assert!(sink.msgs[2].is_audio());
        // Later messages flow directly
        filter.feed(video_frame(40), &mut sink);
        assert_eq!(sink.msgs.len(), 4);
    }

    #[test]
    fn test_dummy_seq_header_at_video_seq_header_ts() {
        let mut filter = DummyAudioFilter::new(300);
        let mut sink = Sink::default();
        filter.feed(video_seq_header(0), &mut sink);
        for i in 0..=8u32 {
            filter.feed(video_frame(i * 40), &mut sink);
        }
        // 8*40 = 320 >= 300 triggers the dummy stage
        let seq = sink
            .msgs
            .iter()
            .find(|m| m.is_audio() && m.payload[1] == 0)
            .expect("dummy aac seq header");
        assert_eq!(seq.payload.as_ref(), &DUMMY_SEQ_HEADER);
        assert_eq!(seq.timestamp_abs, 0);
        // Seq header precedes every dummy frame
        let first_audio = sink.msgs.iter().position(|m| m.is_audio()).unwrap();
        assert_eq!(sink.msgs[first_audio].payload[1], 0);
    }

    #[test]
    fn test_silent_frame_rotation() {
        let mut filter = DummyAudioFilter::new(100);
        let mut sink = Sink::default();
        filter.feed(video_seq_header(0), &mut sink);
        for i in 0..30u32 {
            filter.feed(video_frame(i * 40), &mut sink);
        }
        let audio_ts: Vec<u32> = sink
            .msgs
            .iter()
            .filter(|m| m.is_audio() && m.payload[1] == 1)
            .map(|m| m.timestamp_abs)
            .collect();
        assert!(audio_ts.len() > 10);
        let deltas: Vec<u32> = audio_ts.windows(2).map(|w| w[1] - w[0]).collect();
        for (i, d) in deltas.iter().enumerate() {
            assert_eq!(*d, TS_ROTATION[i % 3], "delta {} at index {}", d, i);
        }
        // Silent frames carry the canonical payload
        for m in sink.msgs.iter().filter(|m| m.is_audio() && m.payload[1] == 1) {
            assert_eq!(m.payload.as_ref(), &DUMMY_FRAME);
        }
    }

    #[test]
    fn test_audio_keeps_pace_with_video() {
        let mut filter = DummyAudioFilter::new(100);
        let mut sink = Sink::default();
        filter.feed(video_seq_header(0), &mut sink);
        for i in 0..50u32 {
            filter.feed(video_frame(i * 40), &mut sink);
        }
        let last_video_ts = 49 * 40;
        let last_audio_ts = sink
            .msgs
            .iter()
            .filter(|m| m.is_audio())
            .map(|m| m.timestamp_abs)
            .max()
            .unwrap();
        // Synthesized audio stays within one frame of the video clock
        assert!(last_audio_ts <= last_video_ts);
        assert!(last_video_ts - last_audio_ts < 22);
    }

    #[test]
    fn test_late_real_audio_dropped() {
        let mut filter = DummyAudioFilter::new(100);
        let mut sink = Sink::default();
        filter.feed(video_seq_header(0), &mut sink);
        for i in 0..5u32 {
            filter.feed(video_frame(i * 40), &mut sink);
        }
        let count = sink.msgs.len();
        filter.feed(audio_frame(200), &mut sink);
        assert_eq!(sink.msgs.len(), count);
    }

    #[test]
    fn test_metadata_passes_through_in_dummy_stage() {
        let mut filter = DummyAudioFilter::new(100);
        let mut sink = Sink::default();
        filter.feed(RtmpMessage::metadata(Bytes::from_static(&[0x02])), &mut sink);
        filter.feed(video_seq_header(0), &mut sink);
        for i in 0..5u32 {
            filter.feed(video_frame(i * 40), &mut sink);
        }
        assert!(sink.msgs.iter().any(|m| m.is_metadata()));
    }
}
