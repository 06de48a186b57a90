//! Decoder for the tempo file format: a stream of 7-byte big-endian
//! records, `tick[4] | uspq[3]`, expected in tick-ascending order.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::error::FatalError;
use crate::sequence::TempoChange;

const RECORD_LEN: usize = 7;

/// Read every record from `reader` into a tick-ascending `Vec<TempoChange>`.
pub fn read_tempo_changes<R: Read>(mut reader: R, path: &str) -> Result<Vec<TempoChange>, FatalError> {
    let mut changes = Vec::new();
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
        let uspq = ((buf[4] as u32) << 16) | ((buf[5] as u32) << 8) | buf[6] as u32;
        changes.push(TempoChange::new(tick, uspq));
    }

    Ok(changes)
}

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
