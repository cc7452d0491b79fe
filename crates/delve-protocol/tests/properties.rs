//! Property tests for the wire codec.
//!
//! These exercise the guarantees the dispatcher relies on: decoding is
//! independent of how the stream is split into reads, and RLE rows survive
//! a round trip in every mode.

use delve_protocol::{
    Action, BigString, Cell, ClientPacket, DecodeError, Field, PacketReader, RleMode,
    SmallString, VisualKind, decode_field, encode_field, rle_decode, rle_encode,
};
use proptest::prelude::*;

// =========================================================================
// Strategies
// =========================================================================

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        any::<u8>().prop_map(|dir| Action::Walk { dir }),
        any::<u8>().prop_map(|dir| Action::Run { dir }),
        any::<u8>().prop_map(|dir| Action::Tunnel { dir }),
        (any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(book, spell, dir)| Action::Cast { book, spell, dir }),
        (any::<i16>(), any::<u8>()).prop_map(|(item, dir)| Action::UseItem { item, dir }),
        any::<i16>().prop_map(|turns| Action::Rest { turns }),
    ]
}

fn arb_client_packet() -> impl Strategy<Value = ClientPacket> {
    prop_oneof![
        Just(ClientPacket::Play),
        Just(ClientPacket::Quit),
        Just(ClientPacket::Redraw),
        any::<u32>().prop_map(|stamp| ClientPacket::Keepalive { stamp }),
        (1u16..300, 1u16..100, 0u8..3).prop_map(|(cols, rows, rle)| ClientPacket::ClientSetup {
            cols,
            rows,
            rle: RleMode::from_u8(rle).unwrap(),
        }),
        (0u8..3, any::<u16>(), proptest::collection::vec((any::<u16>(), any::<u8>()), 0..8))
            .prop_map(|(kind, offset, raw)| ClientPacket::Visuals {
                kind: VisualKind::from_u8(kind).unwrap(),
                offset,
                entries: raw.into_iter().map(|(a, c)| Cell::new(a, c)).collect(),
            }),
        proptest::collection::vec(any::<u8>(), 0..6).prop_map(|flags| ClientPacket::Options { flags }),
        "[ -~]{0,40}".prop_map(|text| ClientPacket::Message { text }),
        arb_action().prop_map(ClientPacket::Action),
    ]
}

fn arb_row(mode: RleMode) -> impl Strategy<Value = Vec<Cell>> {
    let attr_max: u16 = match mode {
        RleMode::None => u16::MAX,
        RleMode::Classic => 0x3f,
        RleMode::Large => 0x7fff,
    };
    // A narrow glyph range makes runs likely.
    proptest::collection::vec(
        (0..=attr_max, prop_oneof![Just(b'#'), Just(b'.'), any::<u8>()]),
        0..120,
    )
    .prop_map(|raw| raw.into_iter().map(|(a, c)| Cell::new(a, c)).collect())
}

fn arb_mode() -> impl Strategy<Value = RleMode> {
    prop_oneof![Just(RleMode::None), Just(RleMode::Classic), Just(RleMode::Large)]
}

/// Feeds `bytes` one at a time, decoding whenever a packet completes.
fn decode_byte_at_a_time(bytes: &[u8]) -> Vec<ClientPacket> {
    let mut pending = Vec::new();
    let mut out = Vec::new();
    for &b in bytes {
        pending.push(b);
        loop {
            let mut r = PacketReader::new(&pending);
            match ClientPacket::decode(&mut r) {
                Ok(packet) => {
                    let used = r.position();
                    pending.drain(..used);
                    out.push(packet);
                }
                Err(DecodeError::Incomplete { .. }) => break,
                Err(e) => panic!("unexpected decode error {e}"),
            }
        }
    }
    assert!(pending.is_empty(), "leftover bytes after full stream");
    out
}

// =========================================================================
// Properties
// =========================================================================

proptest! {
    #[test]
    fn prop_client_packets_survive_byte_at_a_time_delivery(
        packets in proptest::collection::vec(arb_client_packet(), 0..20),
    ) {
        let mut bytes = Vec::new();
        for p in &packets {
            p.encode(&mut bytes);
        }

        let mut whole = Vec::new();
        let mut r = PacketReader::new(&bytes);
        while !r.is_empty() {
            whole.push(ClientPacket::decode(&mut r).unwrap());
        }

        prop_assert_eq!(&whole, &packets);
        prop_assert_eq!(decode_byte_at_a_time(&bytes), packets);
    }

    #[test]
    fn prop_any_split_point_decodes_the_same(
        packets in proptest::collection::vec(arb_client_packet(), 1..10),
        split in any::<prop::sample::Index>(),
    ) {
        let mut bytes = Vec::new();
        for p in &packets {
            p.encode(&mut bytes);
        }
        let at = split.index(bytes.len() + 1);

        // First read: decode what is complete, keep the rest.
        let mut pending = bytes[..at].to_vec();
        let mut out = Vec::new();
        let mut r = PacketReader::new(&pending);
        while let Ok(p) = ClientPacket::decode(&mut r) {
            out.push(p);
        }
        let used = r.position();
        pending.drain(..used);

        // Second read: the remainder arrives.
        pending.extend_from_slice(&bytes[at..]);
        let mut r = PacketReader::new(&pending);
        while !r.is_empty() {
            out.push(ClientPacket::decode(&mut r).unwrap());
        }
        prop_assert_eq!(out, packets);
    }

    #[test]
    fn prop_rle_round_trip(mode in arb_mode(), cells in arb_mode().prop_flat_map(arb_row)) {
        // Rows drawn for a wider mode may carry marker bits; keep the ones
        // valid for `mode` and check the rest are rejected.
        let valid = match mode.marker() {
            Some(m) => cells.iter().all(|c| c.attr & m == 0),
            None => true,
        };
        let mut out = Vec::new();
        let result = rle_encode(&cells, mode, &mut out);
        prop_assert_eq!(result.is_ok(), valid);
        if valid {
            let mut cursor = 0;
            let decoded = rle_decode(&out, &mut cursor, cells.len(), mode).unwrap();
            prop_assert_eq!(cursor, out.len());
            prop_assert_eq!(decoded, cells);
        } else {
            prop_assert!(out.is_empty());
        }
    }

    #[test]
    fn prop_rle_all_identical_row_round_trip(
        mode in arb_mode(),
        len in 0usize..1000,
        ch in any::<u8>(),
        attr in 0u16..0x40,
    ) {
        let cells = vec![Cell::new(attr, ch); len];
        let mut out = Vec::new();
        rle_encode(&cells, mode, &mut out).unwrap();
        let mut cursor = 0;
        prop_assert_eq!(rle_decode(&out, &mut cursor, len, mode).unwrap(), cells);
    }

    #[test]
    fn prop_integer_fields_round_trip(a in any::<u8>(), b in any::<i16>(), c in any::<u32>(), d in any::<i32>()) {
        let mut buf = Vec::new();
        encode_field(&mut buf, &a);
        encode_field(&mut buf, &b);
        encode_field(&mut buf, &c);
        encode_field(&mut buf, &d);
        prop_assert_eq!(buf.len(), 1 + 2 + 4 + 4);

        let mut cursor = 0;
        prop_assert_eq!(decode_field::<u8>(&buf, &mut cursor).unwrap(), a);
        prop_assert_eq!(decode_field::<i16>(&buf, &mut cursor).unwrap(), b);
        prop_assert_eq!(decode_field::<u32>(&buf, &mut cursor).unwrap(), c);
        prop_assert_eq!(decode_field::<i32>(&buf, &mut cursor).unwrap(), d);
    }

    #[test]
    fn prop_string_fields_round_trip_within_limit(s in "\\PC{0,200}") {
        let small = SmallString::new(s.clone());
        let big = BigString::new(s.clone());
        prop_assert!(small.0.len() <= 80);
        prop_assert!(s.starts_with(&small.0));
        prop_assert_eq!(&big.0, &s);

        let mut buf = Vec::new();
        small.encode(&mut buf);
        big.encode(&mut buf);
        let mut cursor = 0;
        prop_assert_eq!(SmallString::decode(&buf, &mut cursor).unwrap(), small);
        prop_assert_eq!(BigString::decode(&buf, &mut cursor).unwrap(), big);
    }
}
