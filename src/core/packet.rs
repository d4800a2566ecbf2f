//! Wire layouts for the three logical channels.
//!
//! ```text
//! routing:     [dest:1][cost:1][nextHop:1] ...      first triplet = (self, selfCost, self)
//! message:     [nextHop:1][source:1][dest:1][id:1][payload:N]
//! propagation: [id:1 (signed, wraps)][payload:N]
//! ```

use crate::core::address::NodeAddress;
use crate::core::bits::{merge_word, pack_bits, split_word, unpack_bits};
use crate::error::constants::{
    ERR_EMPTY_PACKET, ERR_MISSING_ROUTING_HEADER, ERR_RAGGED_TRIPLETS, ERR_TRUNCATED_HEADER,
};
use crate::error::{MeshError, Result};

/// Bytes per routing triplet
pub const TRIPLET_LEN: usize = 3;

/// One `(dest, cost, nextHop)` entry of a routing broadcast, kept as raw wire bytes.
///
/// Interpretation (sentinels, cost clamping) belongs to the routing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triplet {
    pub dest: u8,
    pub cost: u8,
    pub next_hop: u8,
}

impl Triplet {
    pub fn new(dest: u8, cost: u8, next_hop: u8) -> Self {
        Self { dest, cost, next_hop }
    }

    #[inline]
    fn write_to(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[self.dest, self.cost, self.next_hop]);
    }
}

/// Number of non-header triplets that fit next to the header in one packet.
///
/// Never less than one, so a payload limit below two triplets still makes progress.
pub fn entries_per_packet(max_payload: usize) -> usize {
    (max_payload / TRIPLET_LEN).saturating_sub(1).max(1)
}

/// Serialize a routing table into broadcast-sized fragments.
///
/// Every fragment starts with `header`; the entries are spread over as many
/// fragments as needed. An empty table still produces one header-only packet.
pub fn encode_routing_table(header: Triplet, entries: &[Triplet], max_payload: usize) -> Vec<Vec<u8>> {
    let per_packet = entries_per_packet(max_payload);

    if entries.is_empty() {
        let mut packet = Vec::with_capacity(TRIPLET_LEN);
        header.write_to(&mut packet);
        return vec![packet];
    }

    entries
        .chunks(per_packet)
        .map(|chunk| {
            let mut packet = Vec::with_capacity((chunk.len() + 1) * TRIPLET_LEN);
            header.write_to(&mut packet);
            for entry in chunk {
                entry.write_to(&mut packet);
            }
            packet
        })
        .collect()
}

/// Parse a routing fragment into its header and the triplets that follow it.
pub fn decode_routing_packet(data: &[u8]) -> Result<(Triplet, Vec<Triplet>)> {
    if data.is_empty() {
        return Err(MeshError::MalformedPacket(ERR_MISSING_ROUTING_HEADER));
    }
    if data.len() % TRIPLET_LEN != 0 {
        return Err(MeshError::MalformedPacket(ERR_RAGGED_TRIPLETS));
    }

    let mut triplets = data
        .chunks_exact(TRIPLET_LEN)
        .map(|t| Triplet::new(t[0], t[1], t[2]));

    // Non-empty and a multiple of three, so at least one triplet exists
    let header = triplets
        .next()
        .ok_or(MeshError::MalformedPacket(ERR_MISSING_ROUTING_HEADER))?;
    Ok((header, triplets.collect()))
}

/// Fixed 4-byte header of a unicast message packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Hop expected to pick the packet up; `None` when the sender had no route
    pub next_hop: Option<NodeAddress>,
    pub source: NodeAddress,
    pub dest: NodeAddress,
    pub id: u8,
}

impl MessageHeader {
    pub const LEN: usize = 4;
    const LAYOUT: [u32; 4] = [8, 8, 8, 8];

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let word = pack_bits(
            1,
            &[
                NodeAddress::to_wire(self.next_hop) as u32,
                self.source.get() as u32,
                self.dest.get() as u32,
                self.id as u32,
            ],
            &Self::LAYOUT,
        );

        let mut packet = Vec::with_capacity(Self::LEN + payload.len());
        packet.extend_from_slice(&split_word(word[0]));
        packet.extend_from_slice(payload);
        packet
    }

    /// Parse the header; returns it together with the payload slice.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < Self::LEN {
            return Err(MeshError::MalformedPacket(ERR_TRUNCATED_HEADER));
        }

        let word = merge_word([data[0], data[1], data[2], data[3]]);
        let fields = unpack_bits(&[word], &Self::LAYOUT);

        let header = Self {
            next_hop: NodeAddress::from_wire(fields[0] as u8),
            source: NodeAddress::new(fields[1] as u8)?,
            dest: NodeAddress::new(fields[2] as u8)?,
            id: fields[3] as u8,
        };
        Ok((header, &data[Self::LEN..]))
    }

    /// Overwrite the next-hop byte of an encoded message in place.
    pub fn rewrite_next_hop(packet: &mut [u8], next_hop: Option<NodeAddress>) -> Result<()> {
        if packet.len() < Self::LEN {
            return Err(MeshError::MalformedPacket(ERR_TRUNCATED_HEADER));
        }
        packet[0] = NodeAddress::to_wire(next_hop);
        Ok(())
    }
}

/// Flood packet: signed sequence id followed by the event payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodPacket {
    pub id: i8,
    pub payload: Vec<u8>,
}

impl FloodPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + self.payload.len());
        packet.push(self.id as u8);
        packet.extend_from_slice(&self.payload);
        packet
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let (&id, payload) = data
            .split_first()
            .ok_or(MeshError::MalformedPacket(ERR_EMPTY_PACKET))?;
        Ok(Self {
            id: id as i8,
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u8) -> NodeAddress {
        NodeAddress::new(raw).unwrap()
    }

    #[test]
    fn small_table_fits_one_packet() {
        let header = Triplet::new(1, 0, 1);
        let packets = encode_routing_table(header, &[Triplet::new(2, 1, 2)], 12);
        assert_eq!(packets, vec![vec![1, 0, 1, 2, 1, 2]]);
    }

    #[test]
    fn empty_table_sends_header_only() {
        let packets = encode_routing_table(Triplet::new(9, 0, 9), &[], 12);
        assert_eq!(packets, vec![vec![9, 0, 9]]);
    }

    #[test]
    fn large_table_is_chunked_with_header_on_every_fragment() {
        let header = Triplet::new(1, 0, 1);
        let entries: Vec<_> = (2..=9).map(|d| Triplet::new(d, 1, d)).collect();

        // 12 bytes = header + 3 entries
        let packets = encode_routing_table(header, &entries, 12);
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| p.len() <= 12 && p[..3] == [1, 0, 1]));

        let decoded: Vec<Triplet> = packets
            .iter()
            .flat_map(|p| decode_routing_packet(p).unwrap().1)
            .collect();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn tiny_payload_limit_still_progresses() {
        assert_eq!(entries_per_packet(3), 1);
        assert_eq!(entries_per_packet(0), 1);
        assert_eq!(entries_per_packet(31), 9);
    }

    #[test]
    fn routing_decode_rejects_bad_lengths() {
        assert!(matches!(
            decode_routing_packet(&[]),
            Err(MeshError::MalformedPacket(_))
        ));
        assert!(matches!(
            decode_routing_packet(&[1, 0, 1, 2]),
            Err(MeshError::MalformedPacket(_))
        ));
        let (header, rest) = decode_routing_packet(&[4, 0, 4]).unwrap();
        assert_eq!(header, Triplet::new(4, 0, 4));
        assert!(rest.is_empty());
    }

    #[test]
    fn message_header_layout() {
        let header = MessageHeader {
            next_hop: Some(addr(2)),
            source: addr(1),
            dest: addr(3),
            id: 0x7A,
        };
        let packet = header.encode(b"hi");
        assert_eq!(packet, vec![2, 1, 3, 0x7A, b'h', b'i']);

        let (decoded, payload) = MessageHeader::decode(&packet).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(payload, b"hi");
    }

    #[test]
    fn message_header_sentinel_next_hop() {
        let header = MessageHeader {
            next_hop: None,
            source: addr(1),
            dest: addr(3),
            id: 0,
        };
        let mut packet = header.encode(&[]);
        assert_eq!(packet[0], 0xFF);
        assert_eq!(MessageHeader::decode(&packet).unwrap().0.next_hop, None);

        MessageHeader::rewrite_next_hop(&mut packet, Some(addr(5))).unwrap();
        assert_eq!(MessageHeader::decode(&packet).unwrap().0.next_hop, Some(addr(5)));
    }

    #[test]
    fn message_header_rejects_truncation_and_sentinel_endpoints() {
        assert!(MessageHeader::decode(&[1, 2, 3]).is_err());
        assert!(MessageHeader::decode(&[1, 0xFF, 3, 0]).is_err());
        assert!(MessageHeader::rewrite_next_hop(&mut [1, 2], None).is_err());
    }

    #[test]
    fn flood_packet_id_is_signed() {
        let packet = FloodPacket { id: -120, payload: b"ev".to_vec() };
        let bytes = packet.encode();
        assert_eq!(bytes[0], 0x88);
        assert_eq!(FloodPacket::decode(&bytes).unwrap(), packet);
        assert!(FloodPacket::decode(&[]).is_err());
    }
}
