//! RESP framing.
//!
//! Requests are arrays of bulk strings. Replies are one of:
//!
//! - `+<text>\r\n`          simple string
//! - `-<text>\r\n`          error
//! - `:<int>\r\n`           integer
//! - `$<len>\r\n<data>\r\n` bulk string (`$-1\r\n` is null)
//! - `*<n>\r\n<frames>`     array (`*-1\r\n` is null)

use crate::error::{StoreError, StoreResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Longest simple line accepted before the peer is considered broken.
const MAX_LINE_LEN: usize = 64 * 1024;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple status string, e.g. `OK` or `PONG`.
    Simple(String),
    /// Error reply, e.g. `WRONGTYPE Operation against a key ...`.
    Error(String),
    /// Integer reply.
    Integer(i64),
    /// Binary-safe string.
    Bulk(Bytes),
    /// Null bulk string or null array.
    Null,
    /// Array of frames.
    Array(Vec<Frame>),
}

impl Frame {
    /// Builds a request frame from its arguments.
    pub fn command<I, A>(args: I) -> Frame
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        Frame::Array(
            args.into_iter()
                .map(|a| Frame::Bulk(Bytes::copy_from_slice(a.as_ref())))
                .collect(),
        )
    }

    /// Appends the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => put_line(dst, b'+', s.as_bytes()),
            Frame::Error(s) => put_line(dst, b'-', s.as_bytes()),
            Frame::Integer(n) => put_line(dst, b':', n.to_string().as_bytes()),
            Frame::Bulk(data) => put_bulk(dst, data),
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                put_line(dst, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(dst);
                }
            }
        }
    }

    /// Removes one complete frame from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched if more bytes are
    /// needed.
    pub fn decode(src: &mut BytesMut) -> StoreResult<Option<Frame>> {
        let mut pos = 0;
        match parse(&src[..], &mut pos)? {
            Some(frame) => {
                src.advance(pos);
                Ok(Some(frame))
            }
            None => {
                if src.len() > MAX_LINE_LEN && !src.contains(&b'\n') {
                    return Err(protocol_error("line too long"));
                }
                Ok(None)
            }
        }
    }

    /// Returns the frame as a byte slice if it is a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Bulk(data) => Some(&data[..]),
            Frame::Simple(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

/// Appends a request made of `args` to `dst` without building a [`Frame`].
pub fn encode_command(dst: &mut BytesMut, args: &[&[u8]]) {
    put_line(dst, b'*', args.len().to_string().as_bytes());
    for arg in args {
        put_bulk(dst, arg);
    }
}

fn put_line(dst: &mut BytesMut, tag: u8, body: &[u8]) {
    dst.reserve(body.len() + 3);
    dst.put_u8(tag);
    dst.put_slice(body);
    dst.put_slice(CRLF);
}

fn put_bulk(dst: &mut BytesMut, data: &[u8]) {
    put_line(dst, b'$', data.len().to_string().as_bytes());
    dst.reserve(data.len() + 2);
    dst.put_slice(data);
    dst.put_slice(CRLF);
}

fn parse(buf: &[u8], pos: &mut usize) -> StoreResult<Option<Frame>> {
    let line = match read_line(buf, pos) {
        Some(line) => line,
        None => return Ok(None),
    };
    let (&tag, body) = line.split_first().ok_or_else(|| protocol_error("empty line"))?;

    let frame = match tag {
        b'+' => Frame::Simple(text(body)?),
        b'-' => Frame::Error(text(body)?),
        b':' => Frame::Integer(integer(body)?),
        b'$' => {
            let len = integer(body)?;
            if len < 0 {
                return Ok(Some(Frame::Null));
            }
            let len = len as usize;
            let end = *pos + len;
            if buf.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(protocol_error("bulk string not terminated"));
            }
            let data = Bytes::copy_from_slice(&buf[*pos..end]);
            *pos = end + CRLF.len();
            Frame::Bulk(data)
        }
        b'*' => {
            let count = integer(body)?;
            if count < 0 {
                return Ok(Some(Frame::Null));
            }
            let mut items = Vec::with_capacity((count as usize).min(1024));
            for _ in 0..count {
                match parse(buf, pos)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            Frame::Array(items)
        }
        other => return Err(protocol_error(format!("unexpected type byte {:#04x}", other))),
    };

    Ok(Some(frame))
}

fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let start = *pos;
    let len = buf.get(start..)?.windows(2).position(|w| w == CRLF)?;
    *pos = start + len + CRLF.len();
    Some(&buf[start..start + len])
}

fn text(body: &[u8]) -> StoreResult<String> {
    String::from_utf8(body.to_vec()).map_err(|_| protocol_error("reply is not valid UTF-8"))
}

fn integer(body: &[u8]) -> StoreResult<i64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| protocol_error("invalid integer"))
}

fn protocol_error(msg: impl AsRef<str>) -> StoreError {
    StoreError::unknown(format!("protocol error: {}", msg.as_ref()))
}
