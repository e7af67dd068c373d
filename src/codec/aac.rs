//! AAC audio configuration: AudioSpecificConfig and ADTS
//!
//! RTMP/FLV transport AAC raw (no per-frame headers) with an out-of-band
//! AudioSpecificConfig; MPEG-TS transports it ADTS-framed, where every frame
//! carries a 7-byte header. The remuxers convert between the two constantly:
//!
//! ```text
//! ASC (2+ bytes)  | audioObjectType(5) | samplingFrequencyIndex(4)
//!                 | channelConfiguration(4) | ...
//! ADTS (7 bytes)  | syncword(12)=0xFFF | ID(1) | layer(2) | protection(1)
//!                 | profile(2) | samplingFrequencyIndex(4) | private(1)
//!                 | channelConfiguration(3) | ... | aac_frame_length(13)
//!                 | adts_buffer_fullness(11) | no_raw_data_blocks(2)
//! ```
//!
//! Conventions used when packing: `adts_buffer_fullness = 0x7FF` (VBR),
//! `number_of_raw_data_blocks_in_frame = 0`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Byte length of an ADTS header without CRC
pub const ADTS_HEADER_LENGTH: usize = 7;

/// AAC profile (audio object type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacProfile {
    /// AAC Main
    Main = 1,
    /// AAC LC (Low Complexity) - most common
    Lc = 2,
    /// AAC SSR (Scalable Sample Rate)
    Ssr = 3,
    /// AAC LTP (Long Term Prediction)
    Ltp = 4,
    /// SBR (Spectral Band Replication) - HE-AAC
    Sbr = 5,
    /// AAC Scalable
    Scalable = 6,
}

impl AacProfile {
    pub fn from_object_type(ot: u8) -> Option<Self> {
        match ot {
            1 => Some(AacProfile::Main),
            2 => Some(AacProfile::Lc),
            3 => Some(AacProfile::Ssr),
            4 => Some(AacProfile::Ltp),
            5 => Some(AacProfile::Sbr),
            6 => Some(AacProfile::Scalable),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AacProfile::Main => "AAC Main",
            AacProfile::Lc => "AAC LC",
            AacProfile::Ssr => "AAC SSR",
            AacProfile::Ltp => "AAC LTP",
            AacProfile::Sbr => "HE-AAC",
            AacProfile::Scalable => "AAC Scalable",
        }
    }
}

/// Parsed AudioSpecificConfig; doubles as the packing context for ADTS
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, ...)
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    const SAMPLING_FREQUENCIES: [u32; 16] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0,
        0, 0,
    ];

    /// Parse from ASC bytes (the body of an RTMP AAC sequence header after
    /// the two flag bytes).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::MalformedBitstream("asc too short"));
        }
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);
        if sampling_frequency_index > 12 {
            return Err(Error::MalformedBitstream("asc bad sampling frequency index"));
        }
        let sampling_frequency = Self::SAMPLING_FREQUENCIES[sampling_frequency_index as usize];
        let channel_configuration = (b1 >> 3) & 0x0F;

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
        })
    }

    /// Synthesize a context from a parsed ADTS header.
    pub fn from_adts_header(h: &AdtsHeader) -> Self {
        let freq = if (h.sampling_frequency_index as usize) < Self::SAMPLING_FREQUENCIES.len() {
            Self::SAMPLING_FREQUENCIES[h.sampling_frequency_index as usize]
        } else {
            0
        };
        AudioSpecificConfig {
            audio_object_type: h.profile,
            sampling_frequency_index: h.sampling_frequency_index,
            sampling_frequency: freq,
            channel_configuration: h.channel_config,
        }
    }

    /// Emit the 2-byte ASC for this context.
    pub fn to_bytes(&self) -> [u8; 2] {
        [
            (self.audio_object_type << 3) | ((self.sampling_frequency_index >> 1) & 0x07),
            ((self.sampling_frequency_index & 0x01) << 7) | ((self.channel_configuration & 0x0F) << 3),
        ]
    }

    /// Pack a 7-byte ADTS header for a raw frame of `payload_len` bytes.
    /// The header's frame-length field covers the header itself.
    pub fn pack_adts_header(&self, payload_len: usize) -> [u8; 7] {
        let profile = self.audio_object_type.saturating_sub(1); // ADTS stores profile - 1
        let freq_idx = self.sampling_frequency_index;
        let channels = self.channel_configuration;
        let frame_len = payload_len + ADTS_HEADER_LENGTH;

        let mut header = [0u8; 7];
        header[0] = 0xFF;
        header[1] = 0xF1; // MPEG-4, layer 0, no CRC
        header[2] = ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01);
        header[3] = ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8;
        header[4] = ((frame_len >> 3) & 0xFF) as u8;
        header[5] = (((frame_len & 0x07) << 5) | 0x1F) as u8; // + fullness high 5 bits
        header[6] = 0xFC; // fullness low 6 bits + no_raw_data_blocks = 0
        header
    }

    /// Get the profile
    pub fn profile(&self) -> Option<AacProfile> {
        AacProfile::from_object_type(self.audio_object_type)
    }

    /// Samples per frame (LC family is always 1024 here)
    pub fn samples_per_frame(&self) -> u32 {
        1024
    }

    /// Duration of one frame in milliseconds, as a float
    pub fn frame_duration_ms(&self) -> f64 {
        if self.sampling_frequency == 0 {
            return 0.0;
        }
        f64::from(self.samples_per_frame()) * 1000.0 / f64::from(self.sampling_frequency)
    }
}

/// Parsed 7-byte ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// Audio object type (ADTS 2-bit profile field + 1)
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub channel_config: u8,
    /// Total frame length including the 7-byte header
    pub frame_length: u16,
}

impl AdtsHeader {
    /// Parse the fixed ADTS header fields.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ADTS_HEADER_LENGTH {
            return Err(Error::MalformedBitstream("adts header too short"));
        }
        if data[0] != 0xFF || data[1] & 0xF0 != 0xF0 {
            return Err(Error::MalformedBitstream("adts bad sync word"));
        }
        let profile = ((data[2] >> 6) & 0x03) + 1;
        let sampling_frequency_index = (data[2] >> 2) & 0x0F;
        let channel_config = ((data[2] & 0x01) << 2) | ((data[3] >> 6) & 0x03);
        let frame_length = (u16::from(data[3] & 0x03) << 11)
            | (u16::from(data[4]) << 3)
            | (u16::from(data[5]) >> 5);
        Ok(AdtsHeader {
            profile,
            sampling_frequency_index,
            channel_config,
            frame_length,
        })
    }

    /// Synthesize the 2-byte ASC equivalent of this header.
    pub fn to_asc(&self) -> [u8; 2] {
        AudioSpecificConfig::from_adts_header(self).to_bytes()
    }
}

/// Build the RTMP/FLV audio sequence-header payload: `AF 00` + ASC.
pub fn build_audio_seq_header(asc: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(2 + asc.len());
    out.put_slice(&[0xAF, 0x00]);
    out.put_slice(asc);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_asc_parse() {
        // AAC-LC, 44100 Hz, stereo
        let config = AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channel_configuration, 2);
        assert_eq!(config.profile(), Some(AacProfile::Lc));
    }

    #[test]
    fn test_asc_parse_48k() {
        // AAC-LC, 48kHz, stereo: the DummyAudioFilter configuration
        let config = AudioSpecificConfig::parse(&[0x11, 0x90]).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency, 48000);
        assert_eq!(config.channel_configuration, 2);
        assert!((config.frame_duration_ms() - 21.333).abs() < 0.001);
    }

    #[test]
    fn test_asc_to_bytes_round_trip() {
        for asc in [[0x12u8, 0x10], [0x11, 0x90], [0x11, 0x88]] {
            let config = AudioSpecificConfig::parse(&asc).unwrap();
            assert_eq!(config.to_bytes(), asc);
        }
    }

    #[test]
    fn test_asc_too_short() {
        assert!(AudioSpecificConfig::parse(&[0x12]).is_err());
    }

    #[test]
    fn test_adts_pack_parse_round_trip() {
        let config = AudioSpecificConfig::parse(&[0x11, 0x90]).unwrap();
        let header = config.pack_adts_header(341);
        let parsed = AdtsHeader::parse(&header).unwrap();
        assert_eq!(parsed.frame_length, 341 + 7);
        assert_eq!(parsed.profile, 2);
        assert_eq!(parsed.sampling_frequency_index, 3);
        assert_eq!(parsed.channel_config, 2);
    }

    #[test]
    fn test_adts_fullness_conventions() {
        let config = AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap();
        let header = config.pack_adts_header(100);
        // adts_buffer_fullness = 0x7FF, number_of_raw_data_blocks = 0
        assert_eq!(header[5] & 0x1F, 0x1F);
        assert_eq!(header[6], 0xFC);
    }

    #[test]
    fn test_adts_bad_sync() {
        assert!(AdtsHeader::parse(&[0xFE, 0xF1, 0, 0, 0, 0, 0]).is_err());
        assert!(AdtsHeader::parse(&[0xFF, 0xE1, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_adts_to_asc_round_trip() {
        // adtsHeader -> ASC -> adtsHeader(length') keeps fields and fixes length
        let config = AudioSpecificConfig::parse(&[0x11, 0x90]).unwrap();
        let header = config.pack_adts_header(200);
        let parsed = AdtsHeader::parse(&header).unwrap();
        let asc = parsed.to_asc();
        assert_eq!(asc, [0x11, 0x90]);

        let ctx = AudioSpecificConfig::parse(&asc).unwrap();
        let header2 = ctx.pack_adts_header(512);
        let parsed2 = AdtsHeader::parse(&header2).unwrap();
        assert_eq!(parsed2.frame_length, 512 + 7);
        assert_eq!(parsed2.profile, parsed.profile);
        assert_eq!(parsed2.channel_config, parsed.channel_config);
    }

    #[test]
    fn test_build_audio_seq_header() {
        let b = build_audio_seq_header(&[0x11, 0x90]);
        assert_eq!(b.as_ref(), &[0xAF, 0x00, 0x11, 0x90]);
    }

    proptest! {
        #[test]
        fn prop_adts_length_round_trip(
            len in 0usize..8100,
            freq_idx in 0u8..=12,
            channels in 1u8..=7,
        ) {
            let ctx = AudioSpecificConfig {
                audio_object_type: 2,
                sampling_frequency_index: freq_idx,
                sampling_frequency: 48000,
                channel_configuration: channels,
            };
            let header = ctx.pack_adts_header(len);
            let parsed = AdtsHeader::parse(&header).unwrap();
            prop_assert_eq!(parsed.frame_length as usize, len + 7);
            prop_assert_eq!(parsed.sampling_frequency_index, freq_idx);
            prop_assert_eq!(parsed.channel_config, channels);
        }
    }
}
