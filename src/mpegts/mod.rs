//! MPEG-TS container framing
//!
//! This module provides:
//! - TS packet header and adaptation-field parsing
//! - PAT/PMT packing and parsing with CRC-32/MPEG
//! - PES header encoding/decoding with 33-bit timestamps
//! - The frame packetizer that turns one access unit into TS packets

pub mod frame;
pub mod packet;
pub mod pes;
pub mod psi;

pub use frame::{pack_frame, MpegtsFrame};
pub use packet::{AdaptationField, TsPacketHeader};
pub use pes::PesHeader;
pub use psi::{pack_pat, pack_pmt, parse_pat, parse_pmt, PmtStream};

/// Fixed TS packet size
pub const TS_PACKET_SIZE: usize = 188;
/// TS sync byte
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID
pub const PID_PAT: u16 = 0x0000;
/// PMT PID used by the muxer
pub const PID_PMT: u16 = 0x1001;
/// Video elementary stream PID
pub const PID_VIDEO: u16 = 0x0100;
/// Audio elementary stream PID
pub const PID_AUDIO: u16 = 0x0101;

/// H.264 stream type (ISO/IEC 13818-1)
pub const STREAM_TYPE_AVC: u8 = 0x1B;
/// H.265 stream type
pub const STREAM_TYPE_HEVC: u8 = 0x24;
/// AAC-ADTS stream type
pub const STREAM_TYPE_AAC: u8 = 0x0F;

/// PES stream id for video
pub const STREAM_ID_VIDEO: u8 = 0xE0;
/// PES stream id for audio
pub const STREAM_ID_AUDIO: u8 = 0xC0;

/// PCR lags DTS by this many 90 kHz ticks (700 ms)
pub const PCR_DELAY: u64 = 63000;
