//! NAL unit framing
//!
//! Both H.264 and H.265 carry their payloads as NAL units. Two on-wire
//! framings exist and the pipeline converts between them constantly:
//!
//! ```text
//! AVCC    | len(4 BE) | NALU | len(4 BE) | NALU | ...        (RTMP, FLV, MP4)
//! Annex-B | 00 00 00 01 | NALU | 00 00 01 | NALU | ...       (MPEG-TS, raw ES)
//! ```
//!
//! The NALU type lives in the first payload byte: `b0 & 0x1F` for H.264,
//! `(b0 >> 1) & 0x3F` for H.265.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// 4-byte Annex-B start code
pub const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
/// 3-byte Annex-B start code
pub const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// H.264 access unit delimiter NALU (type 9 + primary_pic_type all)
pub const AUD_AVC: [u8; 2] = [0x09, 0xF0];
/// H.265 access unit delimiter NALU (type 35)
pub const AUD_HEVC: [u8; 3] = [0x46, 0x01, 0x50];

/// H.264 NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcNaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl AvcNaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(AvcNaluType::Slice),
            2 => Some(AvcNaluType::SlicePartA),
            3 => Some(AvcNaluType::SlicePartB),
            4 => Some(AvcNaluType::SlicePartC),
            5 => Some(AvcNaluType::Idr),
            6 => Some(AvcNaluType::Sei),
            7 => Some(AvcNaluType::Sps),
            8 => Some(AvcNaluType::Pps),
            9 => Some(AvcNaluType::Aud),
            10 => Some(AvcNaluType::EndSeq),
            11 => Some(AvcNaluType::EndStream),
            12 => Some(AvcNaluType::Filler),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, AvcNaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, AvcNaluType::Sps | AvcNaluType::Pps)
    }
}

/// H.265 NAL unit type (subset the pipeline inspects)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HevcNaluType {
    /// Trailing picture, non-reference
    TrailN = 0,
    /// Trailing picture, reference
    TrailR = 1,
    /// BLA with leading pictures
    BlaWLp = 16,
    /// BLA with RADL leading pictures
    BlaWRadl = 17,
    /// BLA without leading pictures
    BlaNLp = 18,
    /// IDR with RADL leading pictures
    IdrWRadl = 19,
    /// IDR without leading pictures
    IdrNLp = 20,
    /// Clean random access
    Cra = 21,
    /// Video parameter set
    Vps = 32,
    /// Sequence parameter set
    Sps = 33,
    /// Picture parameter set
    Pps = 34,
    /// Access unit delimiter
    Aud = 35,
    /// Prefix SEI
    SeiPrefix = 39,
    /// Suffix SEI
    SeiSuffix = 40,
}

impl HevcNaluType {
    /// Raw 6-bit type code from the first NALU byte
    pub fn code(b: u8) -> u8 {
        (b >> 1) & 0x3F
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match Self::code(b) {
            0 => Some(HevcNaluType::TrailN),
            1 => Some(HevcNaluType::TrailR),
            16 => Some(HevcNaluType::BlaWLp),
            17 => Some(HevcNaluType::BlaWRadl),
            18 => Some(HevcNaluType::BlaNLp),
            19 => Some(HevcNaluType::IdrWRadl),
            20 => Some(HevcNaluType::IdrNLp),
            21 => Some(HevcNaluType::Cra),
            32 => Some(HevcNaluType::Vps),
            33 => Some(HevcNaluType::Sps),
            34 => Some(HevcNaluType::Pps),
            35 => Some(HevcNaluType::Aud),
            39 => Some(HevcNaluType::SeiPrefix),
            40 => Some(HevcNaluType::SeiSuffix),
            _ => None,
        }
    }

    /// Intra random access point: BLA, IDR or CRA (codes 16..=21)
    pub fn is_irap(b: u8) -> bool {
        (16..=21).contains(&Self::code(b))
    }

    pub fn is_parameter_set(b: u8) -> bool {
        matches!(Self::code(b), 32 | 33 | 34)
    }

    pub fn is_aud(b: u8) -> bool {
        Self::code(b) == 35
    }
}

/// Parse the NALU type code from the first payload byte.
pub fn parse_nalu_type(b0: u8, is_h264: bool) -> u8 {
    if is_h264 {
        b0 & 0x1F
    } else {
        (b0 >> 1) & 0x3F
    }
}

/// Walk a buffer of 4-byte length-prefixed NALUs, invoking `f` for each.
///
/// Unlike a best-effort iterator, a length field that overruns the remaining
/// buffer is an error: the whole message is suspect and callers drop it.
pub fn walk_avcc<F: FnMut(&[u8])>(data: &[u8], mut f: F) -> Result<()> {
    let mut offset = 0usize;
    while offset < data.len() {
        if offset + 4 > data.len() {
            return Err(Error::MalformedBitstream("truncated avcc length prefix"));
        }
        let len = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;
        if len == 0 || offset + len > data.len() {
            return Err(Error::MalformedBitstream("avcc length exceeds buffer"));
        }
        f(&data[offset..offset + len]);
        offset += len;
    }
    Ok(())
}

/// Collect the NALUs of an AVCC buffer into slices.
pub fn split_avcc(data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        if offset + 4 > data.len() {
            return Err(Error::MalformedBitstream("truncated avcc length prefix"));
        }
        let len = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;
        if len == 0 || offset + len > data.len() {
            return Err(Error::MalformedBitstream("avcc length exceeds buffer"));
        }
        out.push(&data[offset..offset + len]);
        offset += len;
    }
    Ok(out)
}

/// Find the next Annex-B start code at or after `from`.
///
/// Returns `(payload_start, prefix_len)` where `prefix_len` is 3 or 4.
/// `payload_start` points at the first byte after the start code.
pub fn next_annex_b_start(data: &[u8], from: usize) -> Option<(usize, usize)> {
    if data.len() < 3 {
        return None;
    }
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i + 3, 3));
            }
            if data[i + 2] == 0 && i + 4 <= data.len() && data[i + 3] == 1 {
                return Some((i + 4, 4));
            }
        }
        i += 1;
    }
    None
}

/// Split an Annex-B buffer into NALU slices (start codes removed).
pub fn split_annex_b(data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut out = Vec::new();
    let Some((mut start, _)) = next_annex_b_start(data, 0) else {
        return Err(Error::MalformedBitstream("no annex-b start code"));
    };
    loop {
        match next_annex_b_start(data, start) {
            Some((next_start, prefix_len)) => {
                out.push(&data[start..next_start - prefix_len]);
                start = next_start;
            }
            None => {
                out.push(&data[start..]);
                break;
            }
        }
    }
    Ok(out)
}

/// Convert AVCC framing to Annex-B with 4-byte start codes. Lossless.
pub fn avcc_to_annex_b(data: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(data.len() + 16);
    walk_avcc(data, |nal| {
        out.put_slice(&START_CODE_4);
        out.put_slice(nal);
    })?;
    Ok(out.freeze())
}

/// Convert Annex-B framing to AVCC with 4-byte length prefixes. Lossless.
pub fn annex_b_to_avcc(data: &[u8]) -> Result<Bytes> {
    let nalus = split_annex_b(data)?;
    let mut out = BytesMut::with_capacity(data.len() + 16);
    for nal in nalus {
        out.put_u32(nal.len() as u32);
        out.put_slice(nal);
    }
    Ok(out.freeze())
}
