//! livemux: live-streaming media engine
//!
//! This library is the remuxing core of a live-streaming server: it takes
//! live audio/video in one container and republishes it in others.
//!
//! - RTMP message, FLV tag, and MPEG-TS packet framing
//! - H.264/H.265 NALU handling (Annex-B and AVCC), parameter sets, SPS parsing
//! - AAC AudioSpecificConfig and ADTS framing
//! - Stateful remuxers: RTMP→MPEG-TS, RTMP↔FLV, RTMP↔AvPacket
//! - GOP caches for instant subscriber start-up
//! - A live+record HLS muxer with playlist rolling and segment GC
//!
//! Socket I/O, the RTMP handshake, and HTTP serving are deliberately out of
//! scope: sessions hand complete [`rtmp::RtmpMessage`]s in and observers
//! carry bytes out.
//!
//! # Example: RTMP ingest to HLS
//!
//! ```no_run
//! use livemux::hls::{HlsMuxer, MuxerConfig};
//! use livemux::remux::Rtmp2Mpegts;
//! # fn next_message() -> Option<livemux::rtmp::RtmpMessage> { None }
//!
//! let mut remuxer = Rtmp2Mpegts::new();
//! let mut muxer = HlsMuxer::new("mystream", MuxerConfig::default().out_path("/var/hls"));
//! muxer.start().expect("create output directory");
//!
//! while let Some(msg) = next_message() {
//!     remuxer.feed(msg, &mut muxer);
//! }
//! remuxer.dispose(&mut muxer);
//! muxer.dispose();
//! ```

pub mod codec;
pub mod error;
pub mod flv;
pub mod hls;
pub mod mpegts;
pub mod remux;
pub mod rtmp;
pub mod session;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use hls::{HlsMuxer, MuxerConfig};
pub use remux::{AvPacket, Rtmp2Mpegts};
pub use rtmp::RtmpMessage;
pub use session::CustomizePubSession;
