//! HLS segmentation
//!
//! This module provides:
//! - The live+record HLS muxer driven by the MPEG-TS remuxer
//! - Playlist writing with atomic replacement
//! - A pluggable path strategy for asset naming and URI routing
//! - A file-system abstraction with disk and in-memory implementations

pub mod fragment;
pub mod fs;
pub mod muxer;
pub mod path;
pub mod playlist;

pub use fragment::Fragment;
pub use fs::{DiskFs, FileSystem, FragmentFile, FsKind, MemFs};
pub use muxer::{CleanupMode, HlsEvent, HlsMuxer, HlsMuxerObserver, MakeTsInfo, MuxerConfig};
pub use path::{DefaultPathStrategy, PathStrategy};
pub use playlist::FragmentInfo;
