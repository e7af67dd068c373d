//! m3u8 playlist writing
//!
//! Two playlists per stream: a rolling live playlist rewritten from the
//! fragment ring on every close, and a record playlist that is only ever
//! appended to. Both are written atomically (`<file>.bak` then rename) so a
//! reader never sees a torn file.

use std::path::Path;

use crate::error::Result;
use crate::hls::fs::{is_not_found, FileSystem};

/// Bookkeeping for one fragment in the ring
#[derive(Debug, Clone, Default)]
pub struct FragmentInfo {
    pub id: u64,
    /// Seconds, updated while the fragment is open
    pub duration: f64,
    pub filename: String,
    /// Whether a `#EXT-X-DISCONTINUITY` precedes this fragment
    pub discontinuous: bool,
}

/// Atomic whole-file write.
pub fn atomic_write(fs: &dyn FileSystem, path: &Path, data: &[u8]) -> Result<()> {
    let mut bak = path.as_os_str().to_owned();
    bak.push(".bak");
    let bak = Path::new(&bak);
    fs.write_file(bak, data)?;
    fs.rename(bak, path)
}

fn push_entry(out: &mut String, frag: &FragmentInfo) {
    if frag.discontinuous {
        out.push_str("#EXT-X-DISCONTINUITY\n");
    }
    out.push_str(&format!("#EXTINF:{:.3},\n{}\n", frag.duration, frag.filename));
}

/// Rewrite the live playlist from the current ring window.
pub fn write_live_playlist(
    fs: &dyn FileSystem,
    path: &Path,
    frags: &[&FragmentInfo],
    media_sequence: u64,
    target_duration: u64,
    end_list: bool,
) -> Result<()> {
    let mut out = String::with_capacity(256);
    out.push_str("#EXTM3U\n");
    out.push_str("#EXT-X-VERSION:3\n");
    out.push_str("#EXT-X-ALLOW-CACHE:NO\n");
    out.push_str(&format!("#EXT-X-TARGETDURATION:{target_duration}\n"));
    out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{media_sequence}\n\n"));
    for frag in frags {
        push_entry(&mut out, frag);
    }
    if end_list {
        out.push_str("#EXT-X-ENDLIST\n");
    }
    atomic_write(fs, path, out.as_bytes())
}

/// Append one closed fragment to the record playlist, creating it on first
/// use and keeping `#EXT-X-TARGETDURATION` at the maximum seen.
pub fn append_record_playlist(
    fs: &dyn FileSystem,
    path: &Path,
    frag: &FragmentInfo,
    target_duration: u64,
) -> Result<()> {
    let existing = match fs.read_file(path) {
        Ok(data) => Some(String::from_utf8_lossy(&data).into_owned()),
        Err(e) if is_not_found(&e) => None,
        Err(e) => return Err(e),
    };

    let mut out = match existing {
        Some(content) => {
            let mut kept = String::with_capacity(content.len() + 64);
            for line in content.lines() {
                if line == "#EXT-X-ENDLIST" {
                    continue;
                }
                if let Some(old) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                    let old: u64 = old.trim().parse().unwrap_or(0);
                    kept.push_str(&format!(
                        "#EXT-X-TARGETDURATION:{}\n",
                        old.max(target_duration)
                    ));
                    continue;
                }
                kept.push_str(line);
                kept.push('\n');
            }
            kept
        }
        None => {
            let mut head = String::with_capacity(128);
            head.push_str("#EXTM3U\n");
            head.push_str("#EXT-X-VERSION:3\n");
            head.push_str(&format!("#EXT-X-TARGETDURATION:{target_duration}\n"));
            head.push_str("#EXT-X-MEDIA-SEQUENCE:0\n\n");
            head
        }
    };

    push_entry(&mut out, frag);
    out.push_str("#EXT-X-ENDLIST\n");
    atomic_write(fs, path, out.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::fs::MemFs;
    use std::path::PathBuf;

    fn frag(id: u64, duration: f64, discontinuous: bool) -> FragmentInfo {
        FragmentInfo {
            id,
            duration,
            filename: format!("s-0-{id}.ts"),
            discontinuous,
        }
    }

    fn read(fs: &MemFs, path: &Path) -> String {
        String::from_utf8(fs.read_file(path).unwrap()).unwrap()
    }

    #[test]
    fn test_live_playlist_layout() {
        let fs = MemFs::new();
        let path = PathBuf::from("/s/playlist.m3u8");
        let f0 = frag(3, 4.0, false);
        let f1 = frag(4, 3.967, true);
        write_live_playlist(&fs, &path, &[&f0, &f1], 3, 4, false).unwrap();

        let content = read(&fs, &path);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        assert_eq!(lines[2], "#EXT-X-ALLOW-CACHE:NO");
        assert_eq!(lines[3], "#EXT-X-TARGETDURATION:4");
        assert_eq!(lines[4], "#EXT-X-MEDIA-SEQUENCE:3");
        assert!(content.contains("#EXTINF:4.000,\ns-0-3.ts\n"));
        assert!(content.contains("#EXT-X-DISCONTINUITY\n#EXTINF:3.967,\ns-0-4.ts\n"));
        assert!(!content.contains("#EXT-X-ENDLIST"));
        // No stray .bak left behind
        assert!(!fs.exists(Path::new("/s/playlist.m3u8.bak")));
    }

    #[test]
    fn test_live_playlist_end_list() {
        let fs = MemFs::new();
        let path = PathBuf::from("/s/playlist.m3u8");
        let f0 = frag(0, 2.0, false);
        write_live_playlist(&fs, &path, &[&f0], 0, 3, true).unwrap();
        assert!(read(&fs, &path).ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_record_playlist_creation_and_append() {
        let fs = MemFs::new();
        let path = PathBuf::from("/s/record.m3u8");
        append_record_playlist(&fs, &path, &frag(0, 4.0, false), 4).unwrap();

        let first = read(&fs, &path);
        assert!(first.starts_with("#EXTM3U\n"));
        assert!(first.contains("#EXT-X-MEDIA-SEQUENCE:0"));
        assert!(first.contains("#EXTINF:4.000,\ns-0-0.ts"));
        assert!(first.ends_with("#EXT-X-ENDLIST\n"));

        append_record_playlist(&fs, &path, &frag(1, 3.5, false), 4).unwrap();
        let second = read(&fs, &path);
        assert_eq!(second.matches("#EXT-X-ENDLIST").count(), 1);
        assert!(second.contains("s-0-0.ts"));
        assert!(second.contains("s-0-1.ts"));
        let pos0 = second.find("s-0-0.ts").unwrap();
        let pos1 = second.find("s-0-1.ts").unwrap();
        assert!(pos0 < pos1);
    }

    #[test]
    fn test_record_playlist_bumps_target_duration() {
        let fs = MemFs::new();
        let path = PathBuf::from("/s/record.m3u8");
        append_record_playlist(&fs, &path, &frag(0, 4.0, false), 4).unwrap();
        append_record_playlist(&fs, &path, &frag(1, 7.2, false), 8).unwrap();
        let content = read(&fs, &path);
        assert!(content.contains("#EXT-X-TARGETDURATION:8\n"));
        assert!(!content.contains("#EXT-X-TARGETDURATION:4\n"));

        // A shorter later fragment does not lower it
        append_record_playlist(&fs, &path, &frag(2, 2.0, false), 8).unwrap();
        assert!(read(&fs, &path).contains("#EXT-X-TARGETDURATION:8\n"));
    }

    #[test]
    fn test_record_playlist_discontinuity() {
        let fs = MemFs::new();
        let path = PathBuf::from("/s/record.m3u8");
        append_record_playlist(&fs, &path, &frag(0, 4.0, false), 4).unwrap();
        append_record_playlist(&fs, &path, &frag(1, 4.0, true), 4).unwrap();
        let content = read(&fs, &path);
        assert!(content.contains("#EXT-X-DISCONTINUITY\n#EXTINF:4.000,\ns-0-1.ts"));
    }
}
