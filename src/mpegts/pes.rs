//! PES header encoding and parsing
//!
//! ```text
//! | 00 00 01 | stream_id | pes_packet_length(16) | 10 flags1(6)
//! | PTS_DTS_flags(2) flags2(6) | pes_header_data_length | PTS(5) [DTS(5)] |
//! ```
//!
//! PTS/DTS use the 33-bit interleaved layout: 4-bit marker, then the
//! timestamp split 3/15/15 with a marker bit after each group.

use crate::error::{Error, Result};

/// Encode a 33-bit timestamp into the 5-byte PES layout.
/// `marker` is 0b0010 for lone PTS, 0b0011 for PTS-of-pair, 0b0001 for DTS.
pub fn write_pts_dts(out: &mut Vec<u8>, marker: u8, ts: u64) {
    out.push((marker << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 0x01);
    out.push(((ts >> 22) & 0xFF) as u8);
    out.push(((((ts >> 15) & 0x7F) as u8) << 1) | 0x01);
    out.push(((ts >> 7) & 0xFF) as u8);
    out.push((((ts & 0x7F) as u8) << 1) | 0x01);
}

/// Decode the 5-byte PES timestamp layout.
pub fn read_pts_dts(b: &[u8]) -> Result<u64> {
    if b.len() < 5 {
        return Err(Error::MalformedBitstream("pes timestamp too short"));
    }
    Ok((u64::from(b[0] & 0x0E) << 29)
        | (u64::from(b[1]) << 22)
        | (u64::from(b[2] & 0xFE) << 14)
        | (u64::from(b[3]) << 7)
        | (u64::from(b[4]) >> 1))
}

/// Parsed PES header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    /// pes_packet_length as written; 0 means unbounded
    pub packet_length: u16,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

impl PesHeader {
    /// Parse a PES header. Returns the header and the offset of the ES
    /// payload within `data`.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 9 {
            return Err(Error::MalformedBitstream("pes header too short"));
        }
        if data[0] != 0 || data[1] != 0 || data[2] != 1 {
            return Err(Error::ProtocolViolation("pes missing start code"));
        }
        let stream_id = data[3];
        let packet_length = (u16::from(data[4]) << 8) | u16::from(data[5]);
        let flags = data[7];
        let header_data_length = data[8] as usize;
        let payload_offset = 9 + header_data_length;
        if payload_offset > data.len() {
            return Err(Error::MalformedBitstream("pes header overruns data"));
        }

        let mut pts = None;
        let mut dts = None;
        if flags & 0x80 != 0 {
            pts = Some(read_pts_dts(&data[9..])?);
            if flags & 0x40 != 0 {
                dts = Some(read_pts_dts(&data[14..])?);
            }
        }

        Ok((
            PesHeader {
                stream_id,
                packet_length,
                pts,
                dts,
            },
            payload_offset,
        ))
    }

    /// DTS, falling back to PTS when only PTS was written.
    pub fn dts_or_pts(&self) -> Option<u64> {
        self.dts.or(self.pts)
    }
}
