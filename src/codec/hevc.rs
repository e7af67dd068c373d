//! H.265/HEVC configuration parsing
//!
//! The enhanced-RTMP sequence header for HEVC carries an
//! HEVCDecoderConfigurationRecord (ISO/IEC 14496-15 §8.3.3.1). Unlike the AVC
//! record it stores parameter sets in an array-of-arrays keyed by NALU type:
//!
//! ```text
//! 22 fixed header bytes | numOfArrays (1)
//! | { completeness(1b)+reserved(1b)+nal_unit_type(6b) | numNalus (2)
//!     | { nalUnitLength (2) | nalUnit }* }*
//! ```
//!
//! VPS (32), SPS (33) and PPS (34) arrays are the ones the pipeline needs.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::bits::{strip_emulation_prevention, BitReader};
use crate::codec::nalu::HevcNaluType;
use crate::error::{Error, Result};

/// Parsed HEVCDecoderConfigurationRecord (parameter-set view)
#[derive(Debug, Clone)]
pub struct HevcDecoderConfig {
    pub general_profile_idc: u8,
    pub general_level_idc: u8,
    /// NALU length size (usually 4)
    pub nalu_length_size: u8,
    pub vps: Vec<Bytes>,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl HevcDecoderConfig {
    /// Parse the bare configuration record, scanning the array-of-arrays for
    /// VPS/SPS/PPS NALUs.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 23 {
            return Err(Error::MalformedBitstream("hevc config record too short"));
        }
        let mut data = data;

        let version = data.get_u8();
        if version != 1 {
            return Err(Error::MalformedBitstream("hevc config bad version"));
        }
        let general_profile_idc = data.get_u8() & 0x1F;
        data.advance(4); // general_profile_compatibility_flags
        data.advance(6); // general_constraint_indicator_flags
        let general_level_idc = data.get_u8();
        data.advance(2); // min_spatial_segmentation_idc
        data.advance(1); // parallelismType
        data.advance(1); // chromaFormat
        data.advance(1); // bitDepthLumaMinus8
        data.advance(1); // bitDepthChromaMinus8
        data.advance(2); // avgFrameRate
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_arrays = data.get_u8() as usize;
        let mut vps = Vec::new();
        let mut sps = Vec::new();
        let mut pps = Vec::new();
        for _ in 0..num_arrays {
            if data.len() < 3 {
                return Err(Error::MalformedBitstream("hevc config truncated array"));
            }
            let nalu_type = data.get_u8() & 0x3F;
            let num_nalus = data.get_u16() as usize;
            for _ in 0..num_nalus {
                if data.len() < 2 {
                    return Err(Error::MalformedBitstream("hevc config truncated nalu"));
                }
                let len = data.get_u16() as usize;
                if data.len() < len {
                    return Err(Error::MalformedBitstream("hevc config truncated nalu"));
                }
                let nal = data.copy_to_bytes(len);
                match nalu_type {
                    32 => vps.push(nal),
                    33 => sps.push(nal),
                    34 => pps.push(nal),
                    _ => {}
                }
            }
        }

        Ok(HevcDecoderConfig {
            general_profile_idc,
            general_level_idc,
            nalu_length_size,
            vps,
            sps,
            pps,
        })
    }

    /// Parse from a full RTMP/FLV video sequence-header payload
    /// (`1C 00 00 00 00` + record).
    pub fn parse_seq_header(payload: Bytes) -> Result<Self> {
        if payload.len() < 5 {
            return Err(Error::MalformedBitstream("hevc seq header too short"));
        }
        if payload[0] & 0x0F != 12 || payload[1] != 0 {
            return Err(Error::MalformedBitstream("not a hevc seq header"));
        }
        Self::parse(payload.slice(5..))
    }

    pub fn last_vps(&self) -> Option<&Bytes> {
        self.vps.last()
    }

    pub fn last_sps(&self) -> Option<&Bytes> {
        self.sps.last()
    }

    pub fn last_pps(&self) -> Option<&Bytes> {
        self.pps.last()
    }

    /// Emit the canonical record (`configurationVersion=1`,
    /// `lengthSizeMinusOne=3`) from one VPS, SPS and PPS. The general_*
    /// fields come from the SPS profile_tier_level.
    pub fn build(vps: &[u8], sps: &[u8], pps: &[u8]) -> Result<Bytes> {
        let info = parse_sps(sps)?;
        let mut out = BytesMut::with_capacity(23 + 9 + vps.len() + sps.len() + pps.len() + 6);
        out.put_u8(1); // configurationVersion
        out.put_u8((info.profile_space << 6) | (u8::from(info.tier_flag) << 5) | info.profile_idc);
        out.put_u32(info.profile_compatibility_flags);
        out.put_slice(&info.constraint_indicator_flags.to_be_bytes()[2..]); // 48 bits
        out.put_u8(info.level_idc);
        out.put_u16(0xF000); // reserved + min_spatial_segmentation_idc = 0
        out.put_u8(0xFC); // reserved + parallelismType = 0
        out.put_u8(0xFC | (info.chroma_format_idc as u8 & 0x03));
        out.put_u8(0xF8 | (info.bit_depth_luma_minus8 as u8 & 0x07));
        out.put_u8(0xF8 | (info.bit_depth_chroma_minus8 as u8 & 0x07));
        out.put_u16(0); // avgFrameRate
        // constantFrameRate=0, numTemporalLayers=1, temporalIdNested, lengthSizeMinusOne=3
        out.put_u8((1 << 3) | (u8::from(info.temporal_id_nested) << 2) | 0x03);
        out.put_u8(3); // numOfArrays
        for (nalu_type, nal) in [(32u8, vps), (33, sps), (34, pps)] {
            out.put_u8(0x80 | nalu_type); // array_completeness = 1
            out.put_u16(1);
            out.put_u16(nal.len() as u16);
            out.put_slice(nal);
        }
        Ok(out.freeze())
    }
}

/// Fields parsed from an H.265 SPS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcSpsInfo {
    pub width: u32,
    pub height: u32,
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub profile_compatibility_flags: u32,
    pub constraint_indicator_flags: u64,
    pub level_idc: u8,
    pub chroma_format_idc: u32,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub temporal_id_nested: bool,
}

/// Parse an H.265 SPS NALU (2-byte header included) per H.265 §7.3.2.2.
pub fn parse_sps(sps: &[u8]) -> Result<HevcSpsInfo> {
    if sps.len() < 4 {
        return Err(Error::MalformedBitstream("hevc sps too short"));
    }
    if HevcNaluType::code(sps[0]) != 33 {
        return Err(Error::MalformedBitstream("not a hevc sps"));
    }
    let rbsp = strip_emulation_prevention(&sps[2..]);
    let mut r = BitReader::new(&rbsp);

    let _sps_video_parameter_set_id = r.read_bits(4)?;
    let max_sub_layers_minus1 = r.read_bits(3)? as usize;
    let temporal_id_nested = r.read_bit()? == 1;

    // profile_tier_level
    let profile_space = r.read_bits(2)? as u8;
    let tier_flag = r.read_bit()? == 1;
    let profile_idc = r.read_bits(5)? as u8;
    let profile_compatibility_flags = r.read_bits(32)?;
    let hi = r.read_bits(16)? as u64;
    let lo = r.read_bits(32)? as u64;
    let constraint_indicator_flags = (hi << 32) | lo;
    let level_idc = r.read_bits(8)? as u8;
    let mut profile_present = [false; 8];
    let mut level_present = [false; 8];
    for i in 0..max_sub_layers_minus1 {
        profile_present[i] = r.read_bit()? == 1;
        level_present[i] = r.read_bit()? == 1;
    }
    if max_sub_layers_minus1 > 0 {
        for _ in max_sub_layers_minus1..8 {
            r.skip_bits(2)?;
        }
    }
    for i in 0..max_sub_layers_minus1 {
        if profile_present[i] {
            r.skip_bits(88)?;
        }
        if level_present[i] {
            r.skip_bits(8)?;
        }
    }

    let _sps_seq_parameter_set_id = r.read_ue()?;
    let chroma_format_idc = r.read_ue()?;
    if chroma_format_idc == 3 {
        r.skip_bits(1)?; // separate_colour_plane_flag
    }
    let mut width = r.read_ue()?;
    let mut height = r.read_ue()?;
    if r.read_bit()? == 1 {
        // conformance_window
        let left = r.read_ue()?;
        let right = r.read_ue()?;
        let top = r.read_ue()?;
        let bottom = r.read_ue()?;
        // SubWidthC / SubHeightC per H.265 table 6-1
        let (sub_w, sub_h) = match chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let crop_w = (left + right) * sub_w;
        let crop_h = (top + bottom) * sub_h;
        if crop_w >= width || crop_h >= height {
            return Err(Error::MalformedBitstream("hevc sps cropping exceeds picture"));
        }
        width -= crop_w;
        height -= crop_h;
    }
    let bit_depth_luma_minus8 = r.read_ue()?;
    let bit_depth_chroma_minus8 = r.read_ue()?;

    Ok(HevcSpsInfo {
        width,
        height,
        profile_space,
        tier_flag,
        profile_idc,
        profile_compatibility_flags,
        constraint_indicator_flags,
        level_idc,
        chroma_format_idc,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        temporal_id_nested,
    })
}
