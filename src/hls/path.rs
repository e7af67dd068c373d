//! HLS asset naming and URI routing
//!
//! The on-disk layout is `<root>/<stream>/{playlist.m3u8, record.m3u8,
//! <stream>-<epochMs>-<id>.ts}`. The strategy trait keeps both the muxer's
//! output naming and the HTTP layer's request routing pluggable while they
//! agree with each other.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Naming and routing for HLS assets
pub trait PathStrategy: Send {
    /// Directory all of one stream's assets live in
    fn out_dir(&self, root: &Path, stream_name: &str) -> PathBuf {
        root.join(stream_name)
    }

    /// Basename of a new .ts fragment
    fn fragment_filename(&self, stream_name: &str, id: u64) -> String;

    fn live_playlist_filename(&self) -> &'static str {
        "playlist.m3u8"
    }

    fn record_playlist_filename(&self) -> &'static str {
        "record.m3u8"
    }

    /// Map a request URI under `/hls/` to the file it names, or `None` for
    /// URIs outside the layout.
    fn resolve_uri(&self, root: &Path, uri: &str) -> Option<PathBuf>;

    /// Recover the stream name from a .ts basename.
    fn stream_name_of_ts(&self, filename: &str) -> Option<String>;
}

/// The default `<stream>-<epochMs>-<id>.ts` naming
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPathStrategy;

impl PathStrategy for DefaultPathStrategy {
    fn fragment_filename(&self, stream_name: &str, id: u64) -> String {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{stream_name}-{epoch_ms}-{id}.ts")
    }

    fn resolve_uri(&self, root: &Path, uri: &str) -> Option<PathBuf> {
        let rest = uri.strip_prefix("/hls/")?;
        if rest.is_empty() {
            return None;
        }

        if let Some(stem) = rest.strip_suffix(".m3u8") {
            return match stem.split_once('/') {
                // /hls/<stream>/playlist.m3u8 and /hls/<stream>/record.m3u8
                Some((stream, "playlist")) => {
                    Some(root.join(stream).join(self.live_playlist_filename()))
                }
                Some((stream, "record")) => {
                    Some(root.join(stream).join(self.record_playlist_filename()))
                }
                Some(_) => None,
                // /hls/<stream>.m3u8
                None => Some(root.join(stem).join(self.live_playlist_filename())),
            };
        }

        if rest.ends_with(".ts") {
            return match rest.split_once('/') {
                // /hls/<stream>/<file>.ts
                Some((stream, file)) if !file.contains('/') => {
                    Some(root.join(stream).join(file))
                }
                Some(_) => None,
                // /hls/<file>.ts with the stream name encoded in the prefix
                None => {
                    let stream = self.stream_name_of_ts(rest)?;
                    Some(root.join(stream).join(rest))
                }
            };
        }

        None
    }

    fn stream_name_of_ts(&self, filename: &str) -> Option<String> {
        let stem = filename.strip_suffix(".ts")?;
        let (stream, _) = stem.split_once('-')?;
        if stream.is_empty() {
            return None;
        }
        Some(stream.to_string())
    }
}
