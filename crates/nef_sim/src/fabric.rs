use nef_core::{decode_payload, McPacket, PacketSink};
use serde::Serialize;

/// An outbound packet as seen by the simulated fabric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordedPacket {
    pub tick: u32,
    pub key: u32,
    pub value: f64,
}

/// Multicast fabric stand-in: collects everything the core sends and the
/// time it spends pausing between burst packets.
#[derive(Debug, Default)]
pub struct Fabric {
    tick: u32,
    packets: Vec<RecordedPacket>,
    pause_us: u64,
}

impl Fabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag subsequent packets with `tick`.
    pub fn set_tick(&mut self, tick: u32) {
        self.tick = tick;
    }

    pub fn packets(&self) -> &[RecordedPacket] {
        &self.packets
    }

    pub fn packets_for(&self, key: u32) -> impl Iterator<Item = &RecordedPacket> {
        self.packets.iter().filter(move |p| p.key == key)
    }

    /// Total time spent in inter-packet pauses.
    pub fn total_pause_us(&self) -> u64 {
        self.pause_us
    }
}

impl PacketSink for Fabric {
    fn send(&mut self, packet: McPacket) {
        self.packets.push(RecordedPacket {
            tick: self.tick,
            key: packet.key,
            value: decode_payload(packet.payload).to_num(),
        });
    }

    fn pause_us(&mut self, us: u32) {
        self.pause_us += us as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nef_core::{encode_payload, Fixed};

    #[test]
    fn test_records_tick_and_decoded_value() {
        let mut fabric = Fabric::new();
        fabric.set_tick(3);
        fabric.send(McPacket::new(0x10, encode_payload(Fixed::from_num(-0.5))));
        fabric.pause_us(4);
        fabric.pause_us(4);

        assert_eq!(
            fabric.packets(),
            &[RecordedPacket {
                tick: 3,
                key: 0x10,
                value: -0.5
            }]
        );
        assert_eq!(fabric.total_pause_us(), 8);
        assert_eq!(fabric.packets_for(0x11).count(), 0);
    }
}
