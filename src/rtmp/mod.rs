//! RTMP message layer
//!
//! This module provides:
//! - The `RtmpMessage` type the whole pipeline consumes
//! - Payload predicates (sequence headers, key frames)
//! - Message re-chunking for GOP cache replay
//! - Ordered AMF0 metadata parsing and construction

pub mod chunking;
pub mod message;
pub mod metadata;

pub use chunking::{message_to_chunks, DEFAULT_CHUNK_SIZE};
pub use message::{
    is_aac_seq_header, is_avc_key_seq_header, is_hevc_key_seq_header, is_video_key_nalu,
    is_video_key_seq_header, RtmpMessage,
};
pub use metadata::{build_metadata, parse_metadata, Amf0Value};
