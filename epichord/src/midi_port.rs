//! Abstraction over the MIDI output destination, in the style of
//! `imbolc-audio::engine::backend::AudioBackend`: a semantic-level trait the
//! dispatcher depends on, with a `midir`-backed production implementation
//! and an in-memory recording double for tests.

use crate::error::{FatalError, PortError};
use crate::sequence::Event;

/// Maximum packets buffered in a single frame's dispatch. Mirrors the
/// original's `MAX_PACKETS_PER_FRAME` stack buffer bound; here it bounds a
/// `Vec` rather than sizing a fixed stack array, since the dispatcher owns
/// its thread rather than running inside a driver real-time callback.
pub const MAX_PACKETS_PER_FRAME: usize = 4096;

/// One raw outbound MIDI message, wire-encoded and stamped with the
/// absolute wall-clock nanosecond it should sound. The timestamp is
/// informational for `RecordingPort`; `MidirPort` sends immediately, relying
/// on the platform driver to honor lead time the way the abstract port
/// contract in the design describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub at_ns: u64,
    pub bytes: Vec<u8>,
}

impl Packet {
    pub fn from_event(event: &Event, absolute_song_start_ns: u64) -> Self {
        let len = event.wire_len();
        let mut bytes = Vec::with_capacity(len);
        bytes.push(event.status);
        bytes.push(event.arg1);
        if len == 3 {
            bytes.push(event.arg2);
        }
        Packet { at_ns: event.at_ns + absolute_song_start_ns, bytes }
    }

    pub fn note_off(channel: u8, note: u8, at_ns: u64) -> Self {
        Packet { at_ns, bytes: vec![0x80 | (channel & 0x0F), note, 0] }
    }

    pub fn immediate(status: u8, arg1: u8, arg2: u8, at_ns: u64) -> Self {
        let len = if matches!(status & 0xF0, 0xC0 | 0xD0) { 2 } else { 3 };
        let mut bytes = vec![status, arg1];
        if len == 3 {
            bytes.push(arg2);
        }
        Packet { at_ns, bytes }
    }
}

/// An ordered batch of packets for a single frame, capacity-bounded to catch
/// a pathological sequence (absurd event density) before it grows without limit.
#[derive(Debug, Clone, Default)]
pub struct PacketList {
    packets: Vec<Packet>,
}

impl PacketList {
    pub fn new() -> Self {
        PacketList { packets: Vec::new() }
    }

    pub fn push(&mut self, packet: Packet) -> Result<(), FatalError> {
        if self.packets.len() >= MAX_PACKETS_PER_FRAME {
            return Err(FatalError::PacketListOverflow);
        }
        self.packets.push(packet);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Packet> {
        self.packets.iter()
    }
}

/// Semantic-level MIDI output: "send these packets now." Implementations
/// translate this into a platform MIDI connection or, for tests, record it.
pub trait MidiPort: Send {
    fn send(&mut self, packets: &PacketList) -> Result<(), PortError>;
}

/// `midir`-backed production port, opened against a named output port.
pub struct MidirPort {
    connection: midir::MidiOutputConnection,
}

impl MidirPort {
    /// Open the first available output port whose name contains `port_name`,
    /// or the first available port if `port_name` is `None`.
    pub fn open(client_name: &str, port_name: Option<&str>) -> Result<Self, PortError> {
        let output = midir::MidiOutput::new(client_name)
            .map_err(|e| PortError(format!("could not create midi output: {e}")))?;

        let ports = output.ports();
        let chosen = match port_name {
            Some(wanted) => ports
                .iter()
                .find(|p| {
                    output
                        .port_name(p)
                        .map(|name| name.contains(wanted))
                        .unwrap_or(false)
                })
                .ok_or_else(|| PortError(format!("no midi output port matching '{wanted}'")))?,
            None => ports
                .first()
                .ok_or_else(|| PortError("no midi output ports available".to_string()))?,
        };

        let connection = output
            .connect(chosen, client_name)
            .map_err(|e| PortError(format!("could not connect to midi output: {e}")))?;

        Ok(MidirPort { connection })
    }
}

impl MidiPort for MidirPort {
    fn send(&mut self, packets: &PacketList) -> Result<(), PortError> {
        for packet in packets.iter() {
            self.connection
                .send(&packet.bytes)
                .map_err(|e| PortError(format!("midi send failed: {e}")))?;
        }
        Ok(())
    }
}

/// In-memory recording double: every sent packet is appended to a log,
/// nothing touches the platform. Used by integration tests that need to
/// assert on exactly what was dispatched.
#[derive(Debug, Default)]
pub struct RecordingPort {
    pub sent: Vec<Packet>,
}

impl RecordingPort {
    pub fn new() -> Self {
        RecordingPort::default()
    }
}

impl MidiPort for RecordingPort {
    fn send(&mut self, packets: &PacketList) -> Result<(), PortError> {
        self.sent.extend(packets.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_port_collects_sent_packets() {
        let mut port = RecordingPort::new();
        let mut list = PacketList::new();
        list.push(Packet::note_off(0, 60, 1000)).unwrap();
        port.send(&list).unwrap();
        assert_eq!(port.sent, vec![Packet::note_off(0, 60, 1000)]);
    }

    #[test]
    fn packet_list_rejects_beyond_capacity() {
        let mut list = PacketList::new();
        for _ in 0..MAX_PACKETS_PER_FRAME {
            list.push(Packet::note_off(0, 60, 0)).unwrap();
        }
        assert!(list.push(Packet::note_off(0, 60, 0)).is_err());
    }

    #[test]
    fn packet_from_event_uses_correct_wire_len_and_stamps_absolute_time() {
        let pc = Packet::from_event(&Event::new(0, 0xC0, 5, 0), 1_000);
        assert_eq!(pc.bytes, vec![0xC0, 5]);
        assert_eq!(pc.at_ns, 1_000);
        let mut on = Event::new(0, 0x90, 60, 100);
        on.at_ns = 500;
        let pkt = Packet::from_event(&on, 1_000);
        assert_eq!(pkt.bytes, vec![0x90, 60, 100]);
        assert_eq!(pkt.at_ns, 1_500);
    }
}
