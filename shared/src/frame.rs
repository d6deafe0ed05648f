//! Length-delimited message framing
//!
//! Every message on a stream is written as `varint(len) || body`, where the
//! varint is the usual little-endian base-128 encoding with the high bit of
//! each byte marking continuation (1 to 10 bytes for a `u64`). Bodies are
//! bincode-encoded messages; the framing layer itself treats them as opaque.
//!
//! [`FrameReader`] accepts bytes in whatever chunk sizes the underlying
//! reader produces, keeps bytes read past a frame boundary for the next
//! call, and grows its buffer to fit the frame currently being assembled.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest possible encoding of a `u64` length prefix.
pub const MAX_VARINT_LEN: usize = 10;

/// Largest frame body a reader accepts unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

const INITIAL_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("length prefix does not fit in 64 bits")]
    VarintOverflow,
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: usize },
    #[error("stream ended with {buffered} bytes of an unfinished frame")]
    UnexpectedEof { buffered: usize },
    #[error("message codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Appends the varint encoding of `value` to `out`.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Decodes a varint from the front of `bytes`.
///
/// Returns the value and the number of bytes it occupied, or `None` when
/// `bytes` ends before the varint does.
pub fn decode_varint(bytes: &[u8]) -> Result<Option<(u64, usize)>, FrameError> {
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte may only contribute the top bit of a u64.
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(FrameError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

/// Encodes `body` as one frame.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + MAX_VARINT_LEN);
    encode_varint(body.len() as u64, &mut out);
    out.extend_from_slice(body);
    out
}

pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(body)).await?;
    writer.flush().await?;
    Ok(())
}

/// Serializes `message` with bincode and writes it as one frame.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(message)?;
    write_frame(writer, &body).await
}

/// Splits a byte stream into frames.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    /// Start of unconsumed bytes in `buf`.
    start: usize,
    /// End of valid bytes in `buf`.
    end: usize,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_len(inner, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(inner: R, max_frame_len: usize) -> Self {
        Self {
            inner,
            buf: vec![0; INITIAL_CAPACITY],
            start: 0,
            end: 0,
            max_frame_len,
        }
    }

    /// Bytes read from the stream but not yet returned in a frame.
    pub fn buffered(&self) -> usize {
        self.end - self.start
    }

    /// Reads the next frame body.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames. Ending
    /// anywhere inside a frame is [`FrameError::UnexpectedEof`].
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let (len, prefix_len) = loop {
            if let Some(decoded) = decode_varint(&self.buf[self.start..self.end])? {
                break decoded;
            }
            if !self.fill(self.buffered() + 1).await? {
                return match self.buffered() {
                    0 => Ok(None),
                    buffered => Err(FrameError::UnexpectedEof { buffered }),
                };
            }
        };

        if len > self.max_frame_len as u64 {
            return Err(FrameError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let frame_len = usize::try_from(len)
            .ok()
            .and_then(|body_len| prefix_len.checked_add(body_len))
            .ok_or(FrameError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            })?;
        while self.buffered() < frame_len {
            if !self.fill(frame_len).await? {
                return Err(FrameError::UnexpectedEof {
                    buffered: self.buffered(),
                });
            }
        }

        let body_start = self.start + prefix_len;
        let body = self.buf[body_start..self.start + frame_len].to_vec();
        self.start += frame_len;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }

        Ok(Some(body))
    }

    /// Reads the next frame and decodes it with bincode.
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        match self.read_frame().await? {
            Some(body) => Ok(Some(bincode::deserialize(&body)?)),
            None => Ok(None),
        }
    }

    /// Performs one read, first making room for `target` unconsumed bytes.
    /// Returns false at end of stream.
    async fn fill(&mut self, target: usize) -> Result<bool, FrameError> {
        self.reserve(target);
        let read = self.inner.read(&mut self.buf[self.end..]).await?;
        self.end += read;
        Ok(read > 0)
    }

    fn reserve(&mut self, target: usize) {
        if self.start + target <= self.buf.len() {
            return;
        }

        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        if target > self.buf.len() {
            let grown = target.max(self.buf.len() * 2);
            self.buf.resize(grown, 0);
        }
    }
}
