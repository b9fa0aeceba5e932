//! Length-delimited frames inside a receive burst.
//!
//! A burst copied out of a framed channel's RX queue is an exact
//! concatenation of frames:
//!
//! ```text
//! +------+--------+-----------+-----------------+---------+
//! | 0x7F | config | len (LE)  | payload         | pad     |
//! +------+--------+-----------+-----------------+---------+
//!   1      1        2           len - 4           to 4
//! ```
//!
//! `len` covers the 4-byte header and the payload but not the zero padding
//! that aligns the next frame to a 4-byte boundary. Delivered frames keep
//! their header and drop the padding.

use std::fmt;

/// First byte of every frame.
pub const FRAME_START: u8 = 0x7F;

/// Start byte, config byte and 16-bit length.
pub const FRAME_HEADER_SIZE: usize = 4;

#[inline]
pub const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Why a burst could not be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes left than the header or the padded frame needs.
    Truncated { offset: usize, remaining: usize },
    /// The byte at a frame boundary is not [`FRAME_START`].
    BadStart { offset: usize, byte: u8 },
    /// The length field is smaller than the header.
    BadLength { offset: usize, len: u16 },
    /// A payload too long for the 16-bit length field.
    TooLong { payload: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated { offset, remaining } => {
                write!(f, "truncated frame at offset {offset} ({remaining} bytes left)")
            }
            FrameError::BadStart { offset, byte } => {
                write!(f, "bad start byte {byte:#04x} at offset {offset}")
            }
            FrameError::BadLength { offset, len } => {
                write!(f, "frame length {len} at offset {offset} is shorter than its header")
            }
            FrameError::TooLong { payload } => {
                write!(f, "payload of {payload} bytes does not fit a frame")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// One frame, header included, padding excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    /// The channel/config byte.
    #[inline]
    pub fn config(&self) -> u8 {
        self.bytes[1]
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[FRAME_HEADER_SIZE..]
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Iterator over the frames of a burst.
///
/// Yields one error and then stops if the burst is malformed.
pub struct Frames<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

/// Splits `burst` into frames.
pub fn frames(burst: &[u8]) -> Frames<'_> {
    Frames {
        buf: burst,
        pos: 0,
        failed: false,
    }
}

impl<'a> Frames<'a> {
    fn parse_next(&mut self) -> Result<Frame<'a>, FrameError> {
        let offset = self.pos;
        let rest = &self.buf[offset..];
        if rest.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::Truncated {
                offset,
                remaining: rest.len(),
            });
        }
        if rest[0] != FRAME_START {
            return Err(FrameError::BadStart {
                offset,
                byte: rest[0],
            });
        }
        let len = u16::from_le_bytes([rest[2], rest[3]]);
        if (len as usize) < FRAME_HEADER_SIZE {
            return Err(FrameError::BadLength { offset, len });
        }
        let padded = align4(len as usize);
        if padded > rest.len() {
            return Err(FrameError::Truncated {
                offset,
                remaining: rest.len(),
            });
        }
        self.pos += padded;
        Ok(Frame {
            bytes: &rest[..len as usize],
        })
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Frame<'a>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let item = self.parse_next();
        self.failed = item.is_err();
        Some(item)
    }
}

/// Builds one padded frame around `payload`.
pub fn encode(config: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = FRAME_HEADER_SIZE + payload.len();
    let len16 = u16::try_from(len).map_err(|_| FrameError::TooLong {
        payload: payload.len(),
    })?;
    let mut out = Vec::with_capacity(align4(len));
    out.push(FRAME_START);
    out.push(config);
    out.extend_from_slice(&len16.to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(align4(len), 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_pads_to_four() {
        let frame = encode(3, b"hello").unwrap();
        assert_eq!(frame, [0x7F, 3, 9, 0, b'h', b'e', b'l', b'l', b'o', 0, 0, 0]);
        assert_eq!(encode(0, b"abcd").unwrap().len(), 8);
    }

    #[test]
    fn splits_concatenated_frames_without_padding() {
        let mut burst = encode(1, b"a").unwrap();
        burst.extend(encode(2, b"bcdef").unwrap());
        burst.extend(encode(3, b"").unwrap());

        let parsed: Vec<_> = frames(&burst).collect::<Result<_, _>>().unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].as_bytes(), &[0x7F, 1, 5, 0, b'a']);
        assert_eq!(parsed[1].payload(), b"bcdef");
        assert_eq!(parsed[1].config(), 2);
        assert_eq!(parsed[2].as_bytes().len(), FRAME_HEADER_SIZE);
    }

    #[test]
    fn empty_burst_has_no_frames() {
        assert_eq!(frames(&[]).count(), 0);
    }

    #[test]
    fn bad_start_stops_iteration() {
        let mut burst = encode(1, b"ok").unwrap();
        burst.extend([0x00, 0, 4, 0]);
        burst.extend(encode(1, b"never").unwrap());

        let mut it = frames(&burst);
        assert!(it.next().unwrap().is_ok());
        assert_eq!(
            it.next().unwrap().unwrap_err(),
            FrameError::BadStart { offset: 8, byte: 0 }
        );
        assert!(it.next().is_none());
    }

    #[test]
    fn length_past_end_is_truncated() {
        let mut burst = encode(1, b"abcdefgh").unwrap();
        burst.truncate(10);
        assert_eq!(
            frames(&burst).next().unwrap().unwrap_err(),
            FrameError::Truncated {
                offset: 0,
                remaining: 10
            }
        );
    }

    #[test]
    fn short_length_rejected() {
        let burst = [0x7F, 0, 2, 0];
        assert_eq!(
            frames(&burst).next().unwrap().unwrap_err(),
            FrameError::BadLength { offset: 0, len: 2 }
        );
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0u8; u16::MAX as usize];
        assert!(matches!(encode(0, &payload), Err(FrameError::TooLong { .. })));
    }
}
