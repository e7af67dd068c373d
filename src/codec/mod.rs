//! Codec-bit layer
//!
//! This module provides:
//! - NALU framing (Annex-B and AVCC) and conversion
//! - H.264/H.265 decoder-config records and SPS parsing
//! - AAC AudioSpecificConfig and ADTS headers

pub mod aac;
pub mod avc;
pub mod bits;
pub mod hevc;
pub mod nalu;

pub use aac::{build_audio_seq_header, AacProfile, AdtsHeader, AudioSpecificConfig};
pub use avc::{AvcDecoderConfig, SpsInfo};
pub use hevc::{HevcDecoderConfig, HevcSpsInfo};
pub use nalu::{
    annex_b_to_avcc, avcc_to_annex_b, parse_nalu_type, split_annex_b, split_avcc, walk_avcc,
    AvcNaluType, HevcNaluType,
};

use crate::error::Result;

/// Pixel dimensions from an SPS of either codec.
pub fn parse_sps_dimensions(sps: &[u8], is_h264: bool) -> Result<(u32, u32)> {
    if is_h264 {
        let info = avc::parse_sps(sps)?;
        Ok((info.width, info.height))
    } else {
        let info = hevc::parse_sps(sps)?;
        Ok((info.width, info.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sps_dimensions_both_codecs() {
        let avc_sps: &[u8] = &[0x67, 0x42, 0x00, 0x1E, 0xF4, 0x10, 0x6C, 0x80];
        assert_eq!(parse_sps_dimensions(avc_sps, true).unwrap(), (128, 96));

        let hevc_sps: &[u8] = &[
            0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x5D, 0xA0, 0x02, 0x80, 0x80, 0x2D, 0x17,
        ];
        assert_eq!(parse_sps_dimensions(hevc_sps, false).unwrap(), (1280, 720));
    }
}
