//! Socket framing.
//!
//! Every record on the wire is a 4-byte little-endian length prefix followed
//! by exactly that many payload bytes. The buffer accumulates partial reads
//! and yields whole records; a declared length of zero or above the limit is
//! unrecoverable and the connection must be closed.

use thiserror::Error;

/// Maximum payload size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Framing errors. All of them are fatal for the connection.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("zero-length frame")]
    ZeroLength,
    #[error("frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge(usize),
}

/// Frame a payload with the 4-byte little-endian length prefix.
pub fn frame_message(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u32).to_le_bytes();
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&len);
    out.extend_from_slice(payload);
    out
}

/// Buffer for accumulating bytes and extracting complete frames.
///
/// Handles data arriving in arbitrary chunks: push bytes, then drain whole
/// frames as they complete.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push bytes into the buffer and return an iterator over complete
    /// frames. An `Err` item means the stream is corrupt; the caller must
    /// stop reading and close the connection.
    pub fn push<'a>(&'a mut self, data: &[u8]) -> FrameIterator<'a> {
        self.buffer.extend_from_slice(data);
        FrameIterator { buffer: self }
    }

    fn try_extract(&mut self) -> Option<Result<Vec<u8>, FramingError>> {
        if self.buffer.len() < 4 {
            return None;
        }

        let len = u32::from_le_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if len == 0 {
            return Some(Err(FramingError::ZeroLength));
        }
        if len > MAX_FRAME_SIZE {
            return Some(Err(FramingError::TooLarge(len)));
        }

        if self.buffer.len() < 4 + len {
            return None; // Incomplete
        }

        let frame = self.buffer[4..4 + len].to_vec();
        self.buffer.drain(..4 + len);
        Some(Ok(frame))
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }
}

/// Iterator over complete frames in a buffer.
pub struct FrameIterator<'a> {
    buffer: &'a mut FrameBuffer,
}

impl Iterator for FrameIterator<'_> {
    type Item = Result<Vec<u8>, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.try_extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prefix_is_little_endian() {
        let framed = frame_message(b"test");
        assert_eq!(framed, vec![4, 0, 0, 0, b't', b'e', b's', b't']);
    }

    #[test]
    fn complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames: Vec<_> = buffer.push(&frame_message(b"hello")).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn partial_then_complete() {
        let mut buffer = FrameBuffer::new();

        // Partial header
        let frames: Vec<_> = buffer.push(&[5, 0]).collect();
        assert_eq!(frames.len(), 0);

        // Rest of header + partial payload
        let frames: Vec<_> = buffer.push(&[0, 0, b'h', b'e']).collect();
        assert_eq!(frames.len(), 0);

        // Rest of payload
        let frames: Vec<_> = buffer.push(b"llo").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap(), b"hello");
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut buffer = FrameBuffer::new();

        let mut data = frame_message(b"one");
        data.extend(frame_message(b"two"));
        data.extend(frame_message(b"three"));

        let frames: Vec<_> = buffer.push(&data).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref().unwrap(), b"one");
        assert_eq!(frames[1].as_ref().unwrap(), b"two");
        assert_eq!(frames[2].as_ref().unwrap(), b"three");
    }

    #[test]
    fn zero_length_is_fatal() {
        let mut buffer = FrameBuffer::new();
        let frames: Vec<_> = buffer.push(&[0, 0, 0, 0, 1, 2]).collect();
        assert!(matches!(frames[0], Err(FramingError::ZeroLength)));
    }

    #[test]
    fn oversized_declared_length_is_fatal() {
        let mut buffer = FrameBuffer::new();
        let len = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes();
        let frames: Vec<_> = buffer.push(&len).collect();
        assert!(matches!(frames[0], Err(FramingError::TooLarge(_))));
    }
}
