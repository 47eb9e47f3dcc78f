//! Multipart messages and their wire framing.
//!
//! A [`Message`] is an ordered sequence of opaque byte frames. Frame
//! boundaries are preserved end to end: a three-frame message arrives as
//! exactly three frames, never merged or split. [`MultipartCodec`] maps
//! messages to a length-prefixed wire layout and decodes them incrementally
//! from a byte buffer, returning `None` until a complete message is buffered.
//!
//! Wire layout, all integers big-endian: a `u32` frame count followed by each
//! frame as a `u32` length and its payload bytes.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Lower clamp for the configurable message size limit.
pub const MIN_MESSAGE_LENGTH: usize = 64;

/// Upper clamp for the configurable message size limit (16 MiB).
///
/// Bounds allocation for a single decoded message regardless of what the
/// peer claims in its length prefixes.
pub const MAX_MESSAGE_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_message_length(value: usize) -> usize {
    value.clamp(MIN_MESSAGE_LENGTH, MAX_MESSAGE_LENGTH)
}

const COUNT_PREFIX: usize = 4;
const FRAME_PREFIX: usize = 4;

/// An ordered multipart message of opaque byte frames.
///
/// Zero frames is a valid message and round-trips as such.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Bytes>,
}

impl Message {
    /// Create an empty message.
    #[must_use]
    pub fn empty() -> Self { Self { frames: Vec::new() } }

    /// Create a message from pre-built frames.
    #[must_use]
    pub fn from_frames(frames: Vec<Bytes>) -> Self { Self { frames } }

    /// Create a single-frame message by copying `payload`.
    #[must_use]
    pub fn single(payload: &[u8]) -> Self {
        Self {
            frames: vec![Bytes::copy_from_slice(payload)],
        }
    }

    /// Append a frame to the message.
    pub fn push_frame(&mut self, frame: Bytes) { self.frames.push(frame); }

    /// Frames in wire order.
    #[must_use]
    pub fn frames(&self) -> &[Bytes] { &self.frames }

    /// Number of frames.
    #[must_use]
    pub fn frame_count(&self) -> usize { self.frames.len() }

    /// `true` if the message carries no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.frames.is_empty() }

    /// Total payload bytes across all frames, excluding framing overhead.
    #[must_use]
    pub fn payload_len(&self) -> usize { self.frames.iter().map(Bytes::len).sum() }
}

impl From<Vec<Bytes>> for Message {
    fn from(frames: Vec<Bytes>) -> Self { Self::from_frames(frames) }
}

impl FromIterator<Bytes> for Message {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        Self::from_frames(iter.into_iter().collect())
    }
}

/// Incremental codec for the multipart wire layout.
#[derive(Clone, Debug)]
pub struct MultipartCodec {
    max_message_len: usize,
}

impl MultipartCodec {
    /// Construct a codec with `max_message_len` clamped to the supported
    /// range.
    #[must_use]
    pub fn new(max_message_len: usize) -> Self {
        Self {
            max_message_len: clamp_message_length(max_message_len),
        }
    }

    /// Attempt to decode the next complete message from `src`.
    ///
    /// Consumes nothing until an entire message is buffered, so callers may
    /// keep appending reads to `src` and retrying.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared message size exceeds the configured
    /// maximum.
    pub fn decode(&self, src: &mut BytesMut) -> io::Result<Option<Message>> {
        if src.len() < COUNT_PREFIX {
            return Ok(None);
        }
        let count = read_u32(&src[..COUNT_PREFIX]);
        if count.saturating_mul(FRAME_PREFIX) > self.max_message_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame count exceeds message size limit",
            ));
        }

        // Walk the prefixes without consuming, validating total size as we go.
        let mut offset = COUNT_PREFIX;
        let mut total_payload = 0usize;
        for _ in 0..count {
            if src.len() < offset + FRAME_PREFIX {
                self.check_partial(total_payload)?;
                return Ok(None);
            }
            let len = read_u32(&src[offset..offset + FRAME_PREFIX]);
            total_payload = total_payload.saturating_add(len);
            if total_payload > self.max_message_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("message exceeds {} byte limit", self.max_message_len),
                ));
            }
            offset = offset
                .checked_add(FRAME_PREFIX + len)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame length overflow"))?;
        }
        if src.len() < offset {
            return Ok(None);
        }

        src.advance(COUNT_PREFIX);
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            let len = read_u32(&src[..FRAME_PREFIX]);
            src.advance(FRAME_PREFIX);
            frames.push(src.split_to(len).freeze());
        }
        Ok(Some(Message::from_frames(frames)))
    }

    /// Encode `message` and append the bytes to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message payload exceeds the configured maximum
    /// or a single frame does not fit a `u32` length prefix.
    pub fn encode(&self, message: &Message, dst: &mut BytesMut) -> io::Result<()> {
        if message.payload_len() > self.max_message_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("message exceeds {} byte limit", self.max_message_len),
            ));
        }
        let frames = message.frames();
        let count = u32::try_from(frames.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many frames"))?;

        dst.reserve(COUNT_PREFIX + frames.len() * FRAME_PREFIX + message.payload_len());
        dst.put_u32(count);
        for frame in frames {
            let len = u32::try_from(frame.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
            dst.put_u32(len);
            dst.extend_from_slice(frame);
        }
        Ok(())
    }

    fn check_partial(&self, total_payload: usize) -> io::Result<()> {
        if total_payload > self.max_message_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message exceeds {} byte limit", self.max_message_len),
            ));
        }
        Ok(())
    }
}

impl Default for MultipartCodec {
    fn default() -> Self { Self::new(MAX_MESSAGE_LENGTH) }
}

fn read_u32(bytes: &[u8]) -> usize {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(parts: &[&[u8]]) -> Message {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn round_trips_multipart_message() {
        let codec = MultipartCodec::default();
        let original = msg(&[b"ping", b"", b"payload"]);
        let mut buf = BytesMut::new();
        codec.encode(&original, &mut buf).expect("encode");
        let decoded = codec.decode(&mut buf).expect("decode").expect("complete");
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_message_round_trips() {
        let codec = MultipartCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&Message::empty(), &mut buf).expect("encode");
        assert_eq!(buf.len(), 4);
        let decoded = codec.decode(&mut buf).expect("decode").expect("complete");
        assert!(decoded.is_empty());
    }

    #[test]
    fn decode_waits_for_complete_message() {
        let codec = MultipartCodec::default();
        let mut full = BytesMut::new();
        codec.encode(&msg(&[b"hello", b"world"]), &mut full).expect("encode");

        let mut partial = BytesMut::new();
        for chunk in full.chunks(3) {
            assert!(codec.decode(&mut partial).expect("decode").is_none());
            partial.extend_from_slice(chunk);
        }
        let decoded = codec.decode(&mut partial).expect("decode").expect("complete");
        assert_eq!(decoded, msg(&[b"hello", b"world"]));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let codec = MultipartCodec::new(MIN_MESSAGE_LENGTH);
        let big = vec![0u8; MIN_MESSAGE_LENGTH + 1];
        let mut buf = BytesMut::new();
        assert!(codec.encode(&msg(&[&big]), &mut buf).is_err());

        // A hostile length prefix is rejected on decode as well.
        let mut wire = BytesMut::new();
        wire.put_u32(1);
        wire.put_u32(u32::MAX);
        assert!(codec.decode(&mut wire).is_err());
    }

    #[test]
    fn payload_len_sums_frames() {
        let message = msg(&[b"ab", b"", b"cdef"]);
        assert_eq!(message.payload_len(), 6);
        assert_eq!(message.frame_count(), 3);
    }
}
