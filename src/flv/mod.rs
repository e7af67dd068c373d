//! FLV container framing
//!
//! This module provides:
//! - FLV tag packing and header parsing
//! - A streaming file reader and writer

pub mod reader;
pub mod tag;
pub mod writer;

pub use reader::FlvFileReader;
pub use tag::{FlvTag, FlvTagType, VideoFrameType};
pub use writer::FlvFileWriter;
