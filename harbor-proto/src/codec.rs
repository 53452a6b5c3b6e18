//! Length-prefixed frame codec over any `Read`/`Write` stream.
//!
//! Each frame is: `[u32 big-endian length][postcard payload]`.

use std::io::{self, Read, Write};

use serde::Serialize;

use crate::HandoffReport;

/// Maximum allowed frame payload (64 KiB). Reports are a few hundred bytes.
const MAX_FRAME: u32 = 64 * 1024;

/// Encodes `msg` as a length-prefixed postcard frame and writes it to `w`.
pub fn encode<W: Write>(w: &mut W, msg: &impl Serialize) -> io::Result<()> {
    let payload =
        postcard::to_allocvec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame exceeds u32::MAX"))?;
    // One write so the frame lands atomically on a pipe (len < PIPE_BUF).
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    w.write_all(&frame)?;
    w.flush()
}

/// Reads at most one [`HandoffReport`] from a status pipe.
///
/// Returns `Ok(None)` when the stream ends before any byte of a frame header
/// arrives, i.e. the writer closed without reporting anything.
pub fn read_report(r: &mut impl Read) -> io::Result<Option<HandoffReport>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated report header",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    decode_body(r, u32::from_be_bytes(buf)).map(Some)
}

/// Reads and decodes a report payload of `len` bytes.
fn decode_body(r: &mut impl Read, len: u32) -> io::Result<HandoffReport> {
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds 64 KiB limit",
        ));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    postcard::from_bytes(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
