//! Live + record HLS muxer
//!
//! Consumes the MPEG-TS remuxer's output (PAT/PMT prologue, packed frames,
//! boundary hints) and maintains on disk:
//!
//! - a rolling set of `.ts` fragments,
//! - `playlist.m3u8`, the live window of the newest `fragment_num` entries,
//! - `record.m3u8`, an append-only history of every closed fragment.
//!
//! Fragments roll at the first boundary after `fragment_duration_ms`; a
//! timestamp gap of more than ten target durations force-rolls with a
//! discontinuity marker.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, warn};

use crate::error::Result;
use crate::hls::fragment::Fragment;
use crate::hls::fs::{DiskFs, FileSystem};
use crate::hls::path::{DefaultPathStrategy, PathStrategy};
use crate::hls::playlist::{append_record_playlist, write_live_playlist, FragmentInfo};
use crate::mpegts::{MpegtsFrame, PID_AUDIO};
use crate::remux::rtmp2mpegts::Rtmp2MpegtsObserver;

/// When fragment files are deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Keep every fragment (recording)
    Never,
    /// Delete fragment files only at dispose
    InTheEnd,
    /// Delete each fragment as it leaves the live window
    Asap,
}

/// HLS muxer configuration
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Root output directory; the stream gets a subdirectory
    pub out_path: PathBuf,
    /// Minimum fragment duration before a boundary may roll it
    pub fragment_duration_ms: u32,
    /// Live window size in fragments
    pub fragment_num: usize,
    /// Extra fragments kept on disk beyond the live window in `Asap` mode
    pub delete_threshold: usize,
    pub cleanup_mode: CleanupMode,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            out_path: PathBuf::from("hls"),
            fragment_duration_ms: 3000,
            fragment_num: 6,
            delete_threshold: 0,
            cleanup_mode: CleanupMode::Asap,
        }
    }
}

impl MuxerConfig {
    pub fn out_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.out_path = path.into();
        self
    }

    pub fn fragment_duration_ms(mut self, ms: u32) -> Self {
        self.fragment_duration_ms = ms.max(1);
        self
    }

    pub fn fragment_num(mut self, n: usize) -> Self {
        self.fragment_num = n.max(1);
        self
    }

    pub fn delete_threshold(mut self, n: usize) -> Self {
        self.delete_threshold = n;
        self
    }

    pub fn cleanup_mode(mut self, mode: CleanupMode) -> Self {
        self.cleanup_mode = mode;
        self
    }
}

/// Fragment lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HlsEvent {
    Open,
    Close,
}

/// Payload of [`HlsMuxerObserver::on_hls_make_ts`]
#[derive(Debug, Clone)]
pub struct MakeTsInfo {
    pub event: HlsEvent,
    pub stream_name: String,
    /// Directory holding this stream's assets
    pub cwd: PathBuf,
    pub ts_file: PathBuf,
    pub live_m3u8: PathBuf,
    pub record_m3u8: PathBuf,
    pub id: u64,
    /// Recorded duration in seconds (zero on open)
    pub duration: f64,
}

/// Receiver for fragment lifecycle events
pub trait HlsMuxerObserver {
    fn on_hls_make_ts(&mut self, info: &MakeTsInfo);

    /// Lightweight ping when a fragment opens
    fn on_fragment_open(&mut self) {}
}

/// Live + record HLS muxer for one stream
pub struct HlsMuxer {
    stream_name: String,
    config: MuxerConfig,
    fs: Arc<dyn FileSystem>,
    path_strategy: Box<dyn PathStrategy>,
    observer: Option<Box<dyn HlsMuxerObserver>>,

    pat_pmt: Bytes,
    /// Fragment ring of `fragment_num + delete_threshold + 1` slots
    frags: Vec<FragmentInfo>,
    /// Base index of the live window; also the media sequence
    frag: u64,
    /// Live-window occupancy
    nfrags: usize,
    fragment: Fragment,
    opened: bool,
    /// Timestamp the open fragment started at (90 kHz)
    frag_ts: u64,
    /// Longest fragment duration ever recorded
    max_frag_duration: f64,
    /// Every fragment path written, for `InTheEnd` cleanup
    all_fragment_paths: Vec<PathBuf>,
    disposed: bool,
}

impl HlsMuxer {
    pub fn new(stream_name: impl Into<String>, config: MuxerConfig) -> Self {
        let cap = config.fragment_num + config.delete_threshold + 1;
        Self {
            stream_name: stream_name.into(),
            config,
            fs: Arc::new(DiskFs),
            path_strategy: Box::new(DefaultPathStrategy),
            observer: None,
            pat_pmt: Bytes::new(),
            frags: vec![FragmentInfo::default(); cap],
            frag: 0,
            nfrags: 0,
            fragment: Fragment::new(),
            opened: false,
            frag_ts: 0,
            max_frag_duration: 0.0,
            all_fragment_paths: Vec::new(),
            disposed: false,
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_path_strategy(mut self, strategy: Box<dyn PathStrategy>) -> Self {
        self.path_strategy = strategy;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn HlsMuxerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Create the output directory.
    pub fn start(&mut self) -> Result<()> {
        self.fs.mkdir_all(&self.out_dir())
    }

    /// Final fragment close, `#EXT-X-ENDLIST`, deferred deletions. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.close_fragment(true);
        if self.config.cleanup_mode == CleanupMode::InTheEnd {
            for path in std::mem::take(&mut self.all_fragment_paths) {
                if let Err(e) = self.fs.remove(&path) {
                    warn!(stream = %self.stream_name, path = %path.display(), "cleanup failed: {e}");
                }
            }
        }
    }

    /// Feed one packed frame from the remuxer.
    pub fn feed_mpegts(&mut self, ts_packets: &[u8], frame: &MpegtsFrame, boundary: bool) {
        if self.disposed {
            return;
        }
        let ts = if frame.pid == PID_AUDIO {
            frame.pts
        } else {
            frame.dts
        };
        self.update_fragment(ts, boundary);
        if self.opened {
            if let Err(e) = self.fragment.write_all(ts_packets) {
                error!(stream = %self.stream_name, "fragment write failed, force closing: {e}");
                self.fragment.abandon();
                self.close_fragment(false);
            }
        }
    }

    // ---- internals ----

    fn ring_cap(&self) -> u64 {
        self.frags.len() as u64
    }

    /// Slot of the fragment currently open (or next to open)
    fn cur_idx(&self) -> usize {
        ((self.frag + self.nfrags as u64) % self.ring_cap()) as usize
    }

    fn out_dir(&self) -> PathBuf {
        self.path_strategy
            .out_dir(&self.config.out_path, &self.stream_name)
    }

    fn live_path(&self) -> PathBuf {
        self.out_dir()
            .join(self.path_strategy.live_playlist_filename())
    }

    fn record_path(&self) -> PathBuf {
        self.out_dir()
            .join(self.path_strategy.record_playlist_filename())
    }

    fn target_duration(&self) -> u64 {
        let configured = u64::from(self.config.fragment_duration_ms).div_ceil(1000);
        let recorded = self.max_frag_duration.ceil() as u64;
        configured.max(recorded)
    }

    fn update_fragment(&mut self, ts: u64, boundary: bool) {
        let mut discont = true;
        if self.opened {
            // A gap of more than ten target durations in either direction is
            // a timestamp jump, not a long GOP
            let max_gap = u64::from(self.config.fragment_duration_ms) * 90 * 10;
            if ts.abs_diff(self.frag_ts) > max_gap {
                warn!(
                    stream = %self.stream_name,
                    ts,
                    frag_ts = self.frag_ts,
                    "timestamp jump, force rolling fragment"
                );
                self.close_fragment(false);
                self.open_fragment(ts, true);
                return;
            }

            let duration = ts.saturating_sub(self.frag_ts) as f64 / 90000.0;
            let idx = self.cur_idx();
            if duration > self.frags[idx].duration {
                self.frags[idx].duration = duration;
            }
            if self.frags[idx].duration < f64::from(self.config.fragment_duration_ms) / 1000.0 {
                return;
            }
            discont = false;
        }

        if boundary {
            if self.opened {
                self.close_fragment(false);
            }
            self.open_fragment(ts, discont);
        }
    }

    fn open_fragment(&mut self, ts: u64, discont: bool) {
        debug_assert!(!self.opened);
        let id = self.frag + self.nfrags as u64;
        let filename = self.path_strategy.fragment_filename(&self.stream_name, id);
        let path = self.out_dir().join(&filename);

        if let Err(e) = self.fragment.open(self.fs.as_ref(), &path) {
            error!(stream = %self.stream_name, path = %path.display(), "fragment open failed: {e}");
            return;
        }
        if let Err(e) = self.fragment.write_all(&self.pat_pmt) {
            error!(stream = %self.stream_name, "pat/pmt write failed: {e}");
            self.fragment.abandon();
            return;
        }

        let idx = self.cur_idx();
        self.frags[idx] = FragmentInfo {
            id,
            duration: 0.0,
            filename,
            discontinuous: discont,
        };
        self.opened = true;
        self.frag_ts = ts;
        if self.config.cleanup_mode == CleanupMode::InTheEnd {
            self.all_fragment_paths.push(path.clone());
        }

        self.notify(HlsEvent::Open, idx);
        if let Some(obs) = self.observer.as_mut() {
            obs.on_fragment_open();
        }
    }

    fn close_fragment(&mut self, is_last: bool) {
        if !self.opened {
            if is_last && self.nfrags > 0 {
                // Dispose with nothing open still finalizes the live playlist
                if let Err(e) = self.write_live(true) {
                    error!(stream = %self.stream_name, "live playlist write failed: {e}");
                }
            }
            return;
        }

        if self.fragment.is_open() {
            if let Err(e) = self.fragment.close() {
                error!(stream = %self.stream_name, "fragment close failed: {e}");
            }
        }
        self.opened = false;

        let idx = self.cur_idx();
        let info = self.frags[idx].clone();
        if info.duration > self.max_frag_duration {
            self.max_frag_duration = info.duration;
        }

        if self.nfrags < self.config.fragment_num {
            self.nfrags += 1;
        } else {
            self.frag += 1;
        }

        if let Err(e) = self.write_live(is_last) {
            error!(stream = %self.stream_name, "live playlist write failed: {e}");
        }
        if let Err(e) = append_record_playlist(
            self.fs.as_ref(),
            &self.record_path(),
            &info,
            self.target_duration(),
        ) {
            error!(stream = %self.stream_name, "record playlist write failed: {e}");
        }

        if self.config.cleanup_mode == CleanupMode::Asap {
            self.delete_expired();
        }

        self.notify(HlsEvent::Close, idx);
    }

    /// Remove the fragment whose slot the ring is about to reuse.
    fn delete_expired(&mut self) {
        let idx = self.cur_idx();
        let next_id = self.frag + self.nfrags as u64;
        let expired = &self.frags[idx];
        if expired.filename.is_empty() || expired.id + self.ring_cap() != next_id {
            return;
        }
        let path = self.out_dir().join(&expired.filename);
        if let Err(e) = self.fs.remove(&path) {
            warn!(stream = %self.stream_name, path = %path.display(), "expired fragment remove failed: {e}");
        }
        self.frags[idx].filename.clear();
    }

    fn write_live(&self, is_last: bool) -> Result<()> {
        let cap = self.ring_cap();
        let window: Vec<&FragmentInfo> = (0..self.nfrags)
            .map(|i| &self.frags[((self.frag + i as u64) % cap) as usize])
            .collect();
        write_live_playlist(
            self.fs.as_ref(),
            &self.live_path(),
            &window,
            self.frag,
            self.target_duration(),
            is_last,
        )
    }

    fn notify(&mut self, event: HlsEvent, idx: usize) {
        if self.observer.is_none() {
            return;
        }
        let frag = &self.frags[idx];
        let info = MakeTsInfo {
            event,
            stream_name: self.stream_name.clone(),
            cwd: self.out_dir(),
            ts_file: self.out_dir().join(&frag.filename),
            live_m3u8: self.live_path(),
            record_m3u8: self.record_path(),
            id: frag.id,
            duration: frag.duration,
        };
        if let Some(obs) = self.observer.as_mut() {
            obs.on_hls_make_ts(&info);
        }
    }
}

impl Rtmp2MpegtsObserver for HlsMuxer {
    fn on_pat_pmt(&mut self, bytes: Bytes) {
        self.pat_pmt = bytes;
    }

    fn on_ts_packets(&mut self, bytes: Bytes, frame: &MpegtsFrame, boundary: bool) {
        self.feed_mpegts(&bytes, frame, boundary);
    }
}
