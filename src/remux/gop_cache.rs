//! GOP caches for instant subscriber start-up
//!
//! When a subscriber attaches mid-stream it would otherwise wait up to a
//! full GOP for the next key frame. Both caches keep a small ring of
//! key-frame-aligned GOPs so the group layer can replay decodable content
//! immediately: [`GopCache`] holds serialized RTMP chunks for RTMP/HTTP-FLV
//! subscribers, [`GopCacheMpegts`] holds packed TS slices.
//!
//! Ring layout: `gop_num + 1` slots with `first`/`last` indices, so the
//! newest (possibly in-progress) GOP never evicts a fully cached one that a
//! replay may be reading.

use bytes::Bytes;

use crate::rtmp::message::RtmpMessage;
use crate::rtmp::metadata::{strip_set_data_frame, wrap_set_data_frame};

/// One group of pictures worth of serialized messages
#[derive(Debug, Clone, Default)]
pub struct Gop {
    data: Vec<Bytes>,
}

impl Gop {
    fn feed(&mut self, data: Bytes) {
        self.data.push(data);
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    /// Serialized items in arrival order
    pub fn items(&self) -> &[Bytes] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// RTMP-domain GOP cache
///
/// Feeds take the message plus its chunked serialization (the form a
/// subscriber session writes to the wire), so replay costs no re-chunking.
#[derive(Debug)]
pub struct GopCache {
    gop_ring: Vec<Gop>,
    first: usize,
    last: usize,

    /// Latest metadata with the `@setDataFrame` wrapper
    pub metadata_with_wrapper: Option<Bytes>,
    /// Latest metadata without the wrapper
    pub metadata: Option<Bytes>,
    /// Latest video sequence header, chunked
    pub video_seq_header: Option<Bytes>,
    /// Latest AAC sequence header, chunked
    pub aac_seq_header: Option<Bytes>,
}

impl GopCache {
    /// `gop_num = 0` disables frame caching; headers are still cached.
    pub fn new(gop_num: usize) -> Self {
        Self {
            gop_ring: vec![Gop::default(); gop_num + 1],
            first: 0,
            last: 0,
            metadata_with_wrapper: None,
            metadata: None,
            video_seq_header: None,
            aac_seq_header: None,
        }
    }

    /// Feed one message with its serialized chunk form.
    pub fn feed(&mut self, msg: &RtmpMessage, chunked: Bytes) {
        if msg.is_metadata() {
            let bare = strip_set_data_frame(&msg.payload);
            self.metadata_with_wrapper = Some(wrap_set_data_frame(&bare));
            self.metadata = Some(bare);
            return;
        }
        if msg.is_video_key_seq_header() {
            self.video_seq_header = Some(chunked);
            return;
        }
        if msg.is_aac_seq_header() {
            self.aac_seq_header = Some(chunked);
            return;
        }
        if self.gop_ring.len() <= 1 {
            return;
        }
        self.feed_frame(msg.is_video_key_nalu(), chunked);
    }

    fn feed_frame(&mut self, is_key: bool, chunked: Bytes) {
        let size = self.gop_ring.len();
        if is_key {
            // Start a new GOP, evicting the oldest if the ring is full
            let next = (self.last + 1) % size;
            if next == self.first {
                self.gop_ring[self.first].clear();
                self.first = (self.first + 1) % size;
            }
            self.gop_ring[self.last].clear();
            self.gop_ring[self.last].feed(chunked);
            self.last = next;
        } else {
            if self.gop_count() == 0 {
                // Frames before the first key frame are not replayable
                return;
            }
            let current = (self.last + size - 1) % size;
            self.gop_ring[current].feed(chunked);
        }
    }

    /// Number of cached GOPs; the newest may still be in progress.
    pub fn gop_count(&self) -> usize {
        (self.last + self.gop_ring.len() - self.first) % self.gop_ring.len()
    }

    /// The `idx`-th oldest cached GOP.
    pub fn gop_at(&self, idx: usize) -> Option<&Gop> {
        if idx >= self.gop_count() {
            return None;
        }
        Some(&self.gop_ring[(self.first + idx) % self.gop_ring.len()])
    }

    pub fn clear(&mut self) {
        for gop in &mut self.gop_ring {
            gop.clear();
        }
        self.first = 0;
        self.last = 0;
        self.metadata = None;
        self.metadata_with_wrapper = None;
        self.video_seq_header = None;
        self.aac_seq_header = None;
    }
}

/// MPEG-TS-domain GOP cache
///
/// Slices are concatenated TS packets as produced by the remuxer; a GOP
/// starts wherever the remuxer signalled a boundary. `max_gop_frames`
/// bounds runaway GOPs from streams with sparse key frames.
#[derive(Debug)]
pub struct GopCacheMpegts {
    gop_ring: Vec<Gop>,
    first: usize,
    last: usize,
    /// Frames beyond this per GOP are dropped; 0 means unbounded
    max_gop_frames: usize,
}

impl GopCacheMpegts {
    pub fn new(gop_num: usize, max_gop_frames: usize) -> Self {
        Self {
            gop_ring: vec![Gop::default(); gop_num + 1],
            first: 0,
            last: 0,
            max_gop_frames,
        }
    }

    /// Feed one packed frame; `boundary` starts a new GOP.
    pub fn feed(&mut self, ts_packets: Bytes, boundary: bool) {
        if self.gop_ring.len() <= 1 {
            return;
        }
        let size = self.gop_ring.len();
        if boundary {
            let next = (self.last + 1) % size;
            if next == self.first {
                self.gop_ring[self.first].clear();
                self.first = (self.first + 1) % size;
            }
            self.gop_ring[self.last].clear();
            self.gop_ring[self.last].feed(ts_packets);
            self.last = next;
        } else {
            if self.gop_count() == 0 {
                return;
            }
            let current = (self.last + size - 1) % size;
            if self.max_gop_frames > 0 && self.gop_ring[current].len() >= self.max_gop_frames {
                return;
            }
            self.gop_ring[current].feed(ts_packets);
        }
    }

    pub fn gop_count(&self) -> usize {
        (self.last + self.gop_ring.len() - self.first) % self.gop_ring.len()
    }

    pub fn gop_at(&self, idx: usize) -> Option<&Gop> {
        if idx >= self.gop_count() {
            return None;
        }
        Some(&self.gop_ring[(self.first + idx) % self.gop_ring.len()])
    }

    pub fn clear(&mut self) {
        for gop in &mut self.gop_ring {
            gop.clear();
        }
        self.first = 0;
        self.last = 0;
    }
}
