//! Length-prefixed frames (§4.5): an 8-byte little-endian body length header
//! followed by that many bytes of message body.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Frame header size in bytes.
pub const HEADER_LEN: usize = 8;

/// Default ceiling on a single frame's declared body length, guarding
/// against a peer that sends a bogus multi-gigabyte length header.
pub const DEFAULT_MAX_FRAME_BYTES: u64 = 512 * 1024 * 1024;

/// Writes `body` as one frame: an 8-byte LE length header, then the bytes.
pub fn write_frame<W: Write>(w: &mut W, body: &[u8]) -> Result<()> {
    let mut header = [0u8; HEADER_LEN];
    LittleEndian::write_u64(&mut header, body.len() as u64);
    w.write_all(&header)?;
    w.write_all(body)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame, rejecting declared lengths over `max_frame_bytes` before
/// allocating a buffer for them.
pub fn read_frame<R: Read>(r: &mut R, max_frame_bytes: u64) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header)?;
    let declared = LittleEndian::read_u64(&header);
    if declared > max_frame_bytes {
        return Err(Error::FrameTooLarge {
            declared,
            max: max_frame_bytes,
        });
    }

    let mut body = vec![0u8; declared as usize];
    let mut read_total = 0usize;
    while read_total < body.len() {
        let n = r.read(&mut body[read_total..])?;
        if n == 0 {
            return Err(Error::FrameTruncated {
                expected: declared,
                got: read_total as u64,
            });
        }
        read_total += n;
    }
    Ok(body)
}
