//! Frame-to-TS packetization, the muxing hot path
//!
//! One [`MpegtsFrame`] is a complete access unit (Annex-B video) or a batch
//! of ADTS audio frames, already in its in-stream byte form. `pack_frame`
//! wraps it in a PES packet and splits that across 188-byte TS packets:
//!
//! - the first packet carries PUSI, the PES header, and for key frames an
//!   adaptation field with PCR = DTS - 700 ms;
//! - the final packet absorbs the slack with a stuffing adaptation field.

use bytes::{BufMut, Bytes, BytesMut};

use crate::mpegts::pes::write_pts_dts;
use crate::mpegts::{PCR_DELAY, SYNC_BYTE, TS_PACKET_SIZE};

/// One frame of an elementary stream headed for the TS packetizer
#[derive(Debug, Clone)]
pub struct MpegtsFrame {
    pub pid: u16,
    /// PES stream id (0xE0 video, 0xC0 audio)
    pub stream_id: u8,
    /// Continuity counter; read at entry to `pack_frame` and written back so
    /// the owning remuxer can persist it per PID across calls
    pub cc: u8,
    /// Decode timestamp, 90 kHz
    pub dts: u64,
    /// Presentation timestamp, 90 kHz
    pub pts: u64,
    /// Key frame: the first TS packet carries PCR in an adaptation field
    pub key: bool,
    /// Annex-B NALUs for video, ADTS frames for audio
    pub raw: Bytes,
}

impl MpegtsFrame {
    /// Build the PES packet bytes (header + payload) for this frame.
    fn build_pes(&self) -> Vec<u8> {
        let header_data_len: usize = if self.dts == self.pts { 5 } else { 10 };
        let mut pes = Vec::with_capacity(9 + header_data_len + self.raw.len());
        pes.extend_from_slice(&[0x00, 0x00, 0x01, self.stream_id]);

        let body_len = 3 + header_data_len + self.raw.len();
        let packet_length = if body_len > 0xFFFF { 0 } else { body_len as u16 };
        pes.push((packet_length >> 8) as u8);
        pes.push((packet_length & 0xFF) as u8);

        pes.push(0x80); // '10', no scrambling, no priority
        if header_data_len == 10 {
            pes.push(0xC0); // PTS + DTS
            pes.push(header_data_len as u8);
            write_pts_dts(&mut pes, 0x03, self.pts);
            write_pts_dts(&mut pes, 0x01, self.dts);
        } else {
            pes.push(0x80); // PTS only
            pes.push(header_data_len as u8);
            write_pts_dts(&mut pes, 0x02, self.pts);
        }
        pes.extend_from_slice(&self.raw);
        pes
    }
}

fn write_pcr(out: &mut Vec<u8>, pcr: u64) {
    out.push((pcr >> 25) as u8);
    out.push((pcr >> 17) as u8);
    out.push((pcr >> 9) as u8);
    out.push((pcr >> 1) as u8);
    out.push((((pcr & 1) << 7) as u8) | 0x7E); // reserved bits, extension high bit
    out.push(0x00); // extension low byte
}

/// Packetize one frame into 188-byte TS packets.
///
/// `frame.cc` is consumed as the starting continuity counter and left at the
/// value the next packet on this PID must use.
pub fn pack_frame(frame: &mut MpegtsFrame) -> Bytes {
    let data = frame.build_pes();
    let mut out = BytesMut::with_capacity((data.len() / 184 + 2) * TS_PACKET_SIZE);

    let mut offset = 0usize;
    let mut first = true;
    while offset < data.len() {
        let remaining = data.len() - offset;

        // Adaptation field body: flags byte onward, length byte excluded.
        // An empty body with `has_adaptation` set encodes a length of zero
        // (the one-byte stuffing case).
        let mut adapt: Vec<u8> = Vec::new();
        let mut has_adaptation = false;
        if first && frame.key {
            has_adaptation = true;
            adapt.push(0x50); // random_access + PCR
            write_pcr(&mut adapt, frame.dts.saturating_sub(PCR_DELAY));
        }

        let mut space = TS_PACKET_SIZE - 4 - if has_adaptation { 1 + adapt.len() } else { 0 };
        if remaining < space {
            let stuff = space - remaining;
            if has_adaptation {
                adapt.resize(adapt.len() + stuff, 0xFF);
            } else {
                has_adaptation = true;
                if stuff >= 2 {
                    adapt.push(0x00); // no flags
                    adapt.resize(stuff - 1, 0xFF);
                }
                // stuff == 1: zero-length adaptation field, body stays empty
            }
            space = remaining;
        }

        out.put_u8(SYNC_BYTE);
        let pusi = if first { 0x40 } else { 0x00 };
        out.put_u8(pusi | ((frame.pid >> 8) as u8 & 0x1F));
        out.put_u8(frame.pid as u8);
        let control = if has_adaptation { 0x30 } else { 0x10 };
        out.put_u8(control | (frame.cc & 0x0F));
        frame.cc = (frame.cc + 1) & 0x0F;

        if has_adaptation {
            out.put_u8(adapt.len() as u8);
            out.put_slice(&adapt);
        }
        out.put_slice(&data[offset..offset + space]);
        offset += space;
        first = false;
    }

    out.freeze()
}
