//! Cross-format remuxers and stream filters
//!
//! This module provides:
//! - `Rtmp2Mpegts` with its admission filter, feeding HLS
//! - `Rtmp2Flv` / `Flv2Rtmp` for HTTP-FLV and recording
//! - `Rtmp2AvPacket` / `AvPacket2Rtmp` / `AvPacket2Flv` for the
//!   container-neutral API boundary
//! - GOP caches for instant subscriber start-up
//! - The dummy-audio filter for video-only ingests

pub mod avpacket;
pub mod dummy_audio;
pub mod filter;
pub mod gop_cache;
pub mod rtmp2flv;
pub mod rtmp2mpegts;

pub use avpacket::{
    AvPacket, AvPacket2Flv, AvPacket2FlvObserver, AvPacket2Rtmp, AvPacket2RtmpObserver,
    AvPacketPayloadType, Rtmp2AvPacket, Rtmp2AvPacketObserver, VideoFormat,
};
pub use dummy_audio::{DummyAudioFilter, DummyAudioObserver};
pub use filter::{FilterOp, Rtmp2MpegtsFilter, TimestampRebaseFilter};
pub use gop_cache::{Gop, GopCache, GopCacheMpegts};
pub use rtmp2flv::{Flv2Rtmp, Rtmp2Flv, Rtmp2FlvObserver};
pub use rtmp2mpegts::{Rtmp2Mpegts, Rtmp2MpegtsObserver};
