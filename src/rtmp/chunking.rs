//! RTMP message re-serialization into chunk form
//!
//! The chunk socket layer normally owns chunking; the core only needs the
//! forward direction so cached GOPs can be replayed to a newly attached
//! subscriber without round-tripping through the session.
//!
//! Layout produced per message: one type-0 chunk header carrying the full
//! message header, then type-3 continuation headers every `chunk_size` bytes.
//! Timestamps at or above 0xFFFFFF use the extended-timestamp field, repeated
//! on every continuation chunk.

use bytes::{BufMut, Bytes, BytesMut};

use super::message::RtmpMessage;

/// Protocol default chunk size, used unless the session negotiated another
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Serialize a message into RTMP chunks.
pub fn message_to_chunks(msg: &RtmpMessage, chunk_size: usize) -> Bytes {
    debug_assert!(chunk_size > 0);
    debug_assert!(msg.csid >= 2 && msg.csid < 64, "one-byte basic header only");

    let payload = &msg.payload;
    let num_chunks = payload.len().div_ceil(chunk_size).max(1);
    let mut out = BytesMut::with_capacity(12 + payload.len() + num_chunks * 5);

    let extended = msg.timestamp_abs >= 0xFFFFFF;
    let header_ts = if extended { 0xFFFFFF } else { msg.timestamp_abs };

    // Type-0 chunk: full message header
    out.put_u8((msg.csid & 0x3F) as u8);
    out.put_u8((header_ts >> 16) as u8);
    out.put_u8((header_ts >> 8) as u8);
    out.put_u8(header_ts as u8);
    out.put_u8((payload.len() >> 16) as u8);
    out.put_u8((payload.len() >> 8) as u8);
    out.put_u8(payload.len() as u8);
    out.put_u8(msg.msg_type_id);
    out.put_u32_le(msg.msg_stream_id);
    if extended {
        out.put_u32(msg.timestamp_abs);
    }

    let mut offset = 0usize;
    let mut first = true;
    while offset < payload.len() || first {
        if !first {
            // Type-3 continuation header
            out.put_u8(0xC0 | (msg.csid & 0x3F) as u8);
            if extended {
                out.put_u32(msg.timestamp_abs);
            }
        }
        let n = chunk_size.min(payload.len() - offset);
        out.put_slice(&payload[offset..offset + n]);
        offset += n;
        first = false;
    }

    out.freeze()
}
