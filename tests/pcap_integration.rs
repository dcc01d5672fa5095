//! Builds a minimal in-memory legacy pcap stream (global header + one
//! record) and reads it back with `pcap-parser`, the same library the
//! capture-adjacent demo tooling uses to inspect a capture file, then feeds
//! the recovered frame into the decoder.

mod common;

use common::TcpFlagBits;
use netwatch::decode::{decode, Transport};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use std::io::Cursor;

fn little_endian_pcap(frame: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend([0xd4, 0xc3, 0xb2, 0xa1]); // magic: little-endian, microsecond resolution
    buf.extend(2u16.to_le_bytes()); // version_major
    buf.extend(4u16.to_le_bytes()); // version_minor
    buf.extend(0i32.to_le_bytes()); // thiszone
    buf.extend(0u32.to_le_bytes()); // sigfigs
    buf.extend(65535u32.to_le_bytes()); // snaplen
    buf.extend(1u32.to_le_bytes()); // network = LINKTYPE_ETHERNET

    buf.extend(0u32.to_le_bytes()); // ts_sec
    buf.extend(0u32.to_le_bytes()); // ts_usec
    buf.extend((frame.len() as u32).to_le_bytes()); // incl_len
    buf.extend((frame.len() as u32).to_le_bytes()); // orig_len
    buf.extend(frame);
    buf
}

#[test]
fn reads_frame_from_hand_built_pcap_and_decodes_it() {
    let frame = common::eth_ipv4_tcp(
        [10, 0, 0, 1],
        [8, 8, 8, 8],
        40000,
        443,
        TcpFlagBits { syn: true, ack: false, fin: false, rst: false },
        &[],
    );
    let pcap_bytes = little_endian_pcap(&frame);

    let mut reader = LegacyPcapReader::new(65536, Cursor::new(pcap_bytes)).expect("valid pcap header");
    let mut frames_seen = 0;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::Legacy(pcap_block) = block {
                    frames_seen += 1;
                    let decoded = decode(pcap_block.data).expect("frame should decode");
                    match decoded.transport {
                        Transport::Tcp { src_port, dst_port, flags, .. } => {
                            assert_eq!(src_port, 40000);
                            assert_eq!(dst_port, 443);
                            assert!(flags.syn);
                        }
                        _ => panic!("expected TCP transport"),
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().expect("refill should succeed for a complete in-memory buffer");
            }
            Err(err) => panic!("unexpected pcap read error: {err:?}"),
        }
    }

    assert_eq!(frames_seen, 1);
}
