//! Decoder for the sequence file format: a stream of 7-byte big-endian
//! records, `tick[4] | statusByte[1] | arg1[1] | arg2[1]`, expected in
//! tick-ascending order.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::error::FatalError;
use crate::sequence::Event;

const RECORD_LEN: usize = 7;

/// Read every record from `reader` into a tick-ascending `Vec<Event>`.
/// A trailing partial record (EOF mid-record) is fatal, per the design's
/// capacity/invariant error class.
pub fn read_events<R: Read>(mut reader: R, path: &str) -> Result<Vec<Event>, FatalError> {
    let mut events = Vec::new();
    let mut buf = [0u8; RECORD_LEN];

    loop {
        let bytes_read = read_fill(&mut reader, &mut buf)?;
        if bytes_read == 0 {
            break;
        }
        if bytes_read != RECORD_LEN {
            return Err(FatalError::TruncatedRecord { path: path.to_string(), bytes_read });
        }

        let tick = BigEndian::read_u32(&buf[0..4]);
        events.push(Event::new(tick, buf[4], buf[5], buf[6]));
    }

    Ok(events)
}

/// Fill `buf` from `reader`, returning the number of bytes actually read
/// before EOF (which may be `0 < n < buf.len()` for a truncated final
/// record, or `0` for a clean EOF at a record boundary).
fn read_fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FatalError> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FatalError::TruncatedRecord { path: e.to_string(), bytes_read: total }),
        }
    }
    Ok(total)
}
