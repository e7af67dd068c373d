//! H.264/AVC configuration parsing
//!
//! RTMP and FLV transport H.264 in AVCC format with an out-of-band
//! AVCDecoderConfigurationRecord (ISO/IEC 14496-15 §5.2.4):
//!
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```
//!
//! The video sequence-header payload wraps this record behind 5 RTMP bytes:
//! `17 00 00 00 00` (keyframe + AVC codec id, packet type 0, zero CTS).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::bits::{strip_emulation_prevention, BitReader};
use crate::error::{Error, Result};

/// Parsed AVCDecoderConfigurationRecord
#[derive(Debug, Clone)]
pub struct AvcDecoderConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, ...)
    pub profile: u8,
    /// Profile compatibility flags
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// NALU length size (usually 4)
    pub nalu_length_size: u8,
    /// Sequence parameter sets
    pub sps: Vec<Bytes>,
    /// Picture parameter sets
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfig {
    /// Parse the bare configuration record.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 7 {
            return Err(Error::MalformedBitstream("avc config record too short"));
        }
        let mut data = data;

        let version = data.get_u8();
        if version != 1 {
            return Err(Error::MalformedBitstream("avc config bad version"));
        }
        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let mut sps = Vec::with_capacity(num_sps);
        for _ in 0..num_sps {
            if data.len() < 2 {
                return Err(Error::MalformedBitstream("avc config truncated sps"));
            }
            let len = data.get_u16() as usize;
            if data.len() < len {
                return Err(Error::MalformedBitstream("avc config truncated sps"));
            }
            sps.push(data.copy_to_bytes(len));
        }

        if data.is_empty() {
            return Err(Error::MalformedBitstream("avc config truncated pps"));
        }
        let num_pps = data.get_u8() as usize;
        let mut pps = Vec::with_capacity(num_pps);
        for _ in 0..num_pps {
            if data.len() < 2 {
                return Err(Error::MalformedBitstream("avc config truncated pps"));
            }
            let len = data.get_u16() as usize;
            if data.len() < len {
                return Err(Error::MalformedBitstream("avc config truncated pps"));
            }
            pps.push(data.copy_to_bytes(len));
        }

        Ok(AvcDecoderConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    /// Parse from a full RTMP/FLV video sequence-header payload
    /// (`17 00 00 00 00` + record).
    pub fn parse_seq_header(payload: Bytes) -> Result<Self> {
        if payload.len() < 5 {
            return Err(Error::MalformedBitstream("avc seq header too short"));
        }
        if payload[0] & 0x0F != 7 || payload[1] != 0 {
            return Err(Error::MalformedBitstream("not an avc seq header"));
        }
        Self::parse(payload.slice(5..))
    }

    /// Last SPS in the record; re-announced parameter sets override earlier ones.
    pub fn last_sps(&self) -> Option<&Bytes> {
        self.sps.last()
    }

    /// Last PPS in the record.
    pub fn last_pps(&self) -> Option<&Bytes> {
        self.pps.last()
    }

    /// Emit the canonical record (`configurationVersion=1`,
    /// `lengthSizeMinusOne=3`) from one SPS and one PPS.
    pub fn build(sps: &[u8], pps: &[u8]) -> Result<Bytes> {
        if sps.len() < 4 {
            return Err(Error::MalformedBitstream("sps too short for avc config"));
        }
        let mut out = BytesMut::with_capacity(11 + sps.len() + pps.len());
        out.put_u8(1); // configurationVersion
        out.put_u8(sps[1]); // AVCProfileIndication
        out.put_u8(sps[2]); // profile_compatibility
        out.put_u8(sps[3]); // AVCLevelIndication
        out.put_u8(0xFF); // lengthSizeMinusOne = 3
        out.put_u8(0xE1); // numOfSPS = 1
        out.put_u16(sps.len() as u16);
        out.put_slice(sps);
        out.put_u8(1); // numOfPPS
        out.put_u16(pps.len() as u16);
        out.put_slice(pps);
        Ok(out.freeze())
    }

    /// Human-readable profile name
    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4",
            _ => "Unknown",
        }
    }

    /// Level as a string (e.g., "3.1")
    pub fn level_string(&self) -> String {
        format!("{}.{}", self.level / 10, self.level % 10)
    }
}

/// Dimensions and identification parsed from an SPS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsInfo {
    pub width: u32,
    pub height: u32,
    pub profile_idc: u8,
    pub level_idc: u8,
}

/// Parse width/height/profile/level from an H.264 SPS NALU
/// (header byte included), per ITU-T H.264 §7.3.2.1.
pub fn parse_sps(sps: &[u8]) -> Result<SpsInfo> {
    if sps.len() < 4 {
        return Err(Error::MalformedBitstream("sps too short"));
    }
    let rbsp = strip_emulation_prevention(&sps[1..]);
    let mut r = BitReader::new(&rbsp);

    let profile_idc = r.read_bits(8)? as u8;
    r.skip_bits(8)?; // constraint flags + reserved
    let level_idc = r.read_bits(8)? as u8;
    let _seq_parameter_set_id = r.read_ue()?;

    let mut chroma_format_idc = 1u32;
    let mut separate_colour_plane = false;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = r.read_ue()?;
        if chroma_format_idc == 3 {
            separate_colour_plane = r.read_bit()? == 1;
        }
        let _bit_depth_luma_minus8 = r.read_ue()?;
        let _bit_depth_chroma_minus8 = r.read_ue()?;
        r.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if r.read_bit()? == 1 {
            // seq_scaling_matrix_present
            let count = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..count {
                if r.read_bit()? == 1 {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let _log2_max_frame_num_minus4 = r.read_ue()?;
    let pic_order_cnt_type = r.read_ue()?;
    if pic_order_cnt_type == 0 {
        let _log2_max_pic_order_cnt_lsb_minus4 = r.read_ue()?;
    } else if pic_order_cnt_type == 1 {
        r.skip_bits(1)?; // delta_pic_order_always_zero_flag
        let _offset_for_non_ref_pic = r.read_se()?;
        let _offset_for_top_to_bottom_field = r.read_se()?;
        let cycles = r.read_ue()?;
        for _ in 0..cycles {
            let _ = r.read_se()?;
        }
    }
    let _max_num_ref_frames = r.read_ue()?;
    r.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = r.read_ue()?;
    let pic_height_in_map_units_minus1 = r.read_ue()?;
    let frame_mbs_only = r.read_bit()?;
    if frame_mbs_only == 0 {
        r.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    r.skip_bits(1)?; // direct_8x8_inference_flag

    let mut width = (pic_width_in_mbs_minus1 + 1) * 16;
    let mut height = (2 - frame_mbs_only) * (pic_height_in_map_units_minus1 + 1) * 16;

    if r.read_bit()? == 1 {
        // frame_cropping
        let crop_left = r.read_ue()?;
        let crop_right = r.read_ue()?;
        let crop_top = r.read_ue()?;
        let crop_bottom = r.read_ue()?;

        let chroma_array_type = if separate_colour_plane {
            0
        } else {
            chroma_format_idc
        };
        // SubWidthC / SubHeightC per H.264 table 6-1
        let (crop_unit_x, crop_unit_y) = match chroma_array_type {
            0 => (1, 2 - frame_mbs_only),
            1 => (2, 2 * (2 - frame_mbs_only)),
            2 => (2, 2 - frame_mbs_only),
            _ => (1, 2 - frame_mbs_only),
        };
        let crop_w = (crop_left + crop_right) * crop_unit_x;
        let crop_h = (crop_top + crop_bottom) * crop_unit_y;
        if crop_w >= width || crop_h >= height {
            return Err(Error::MalformedBitstream("sps cropping exceeds picture"));
        }
        width -= crop_w;
        height -= crop_h;
    }

    Ok(SpsInfo {
        width,
        height,
        profile_idc,
        level_idc,
    })
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.read_se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}
