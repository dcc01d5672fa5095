mod common;

use common::TcpFlagBits;
use netwatch::decode::{decode, Transport};
use std::net::IpAddr;

#[test]
fn decodes_ipv4_tcp_syn() {
    let frame = common::eth_ipv4_tcp(
        [10, 0, 0, 1],
        [8, 8, 8, 8],
        40000,
        443,
        TcpFlagBits { syn: true, ack: false, fin: false, rst: false },
        &[],
    );
    let decoded = decode(&frame).expect("frame should decode");
    assert_eq!(decoded.ip_version, 4);
    assert_eq!(decoded.src_ip, IpAddr::from([10, 0, 0, 1]));
    assert_eq!(decoded.dst_ip, IpAddr::from([8, 8, 8, 8]));
    match decoded.transport {
        Transport::Tcp { src_port, dst_port, flags, .. } => {
            assert_eq!(src_port, 40000);
            assert_eq!(dst_port, 443);
            assert!(flags.syn && !flags.ack);
        }
        _ => panic!("expected TCP transport"),
    }
}

#[test]
fn decodes_ipv4_udp() {
    let frame = common::eth_ipv4_udp([192, 168, 1, 2], [8, 8, 8, 8], 50000, 53, b"hello");
    let decoded = decode(&frame).expect("frame should decode");
    match decoded.transport {
        Transport::Udp { src_port, dst_port, payload } => {
            assert_eq!(src_port, 50000);
            assert_eq!(dst_port, 53);
            assert_eq!(payload, b"hello");
        }
        _ => panic!("expected UDP transport"),
    }
}

#[test]
fn decodes_icmpv4() {
    let frame = common::eth_ipv4_icmp([10, 0, 0, 1], [10, 0, 0, 2], 8, 0);
    let decoded = decode(&frame).expect("frame should decode");
    match decoded.transport {
        Transport::Icmp { icmp_type, icmp_code } => {
            assert_eq!(icmp_type, 8);
            assert_eq!(icmp_code, 0);
        }
        _ => panic!("expected ICMP transport"),
    }
}

#[test]
fn decodes_icmpv6_neighbor_solicitation() {
    let src = [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
    let dst = [0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0xff, 0, 0, 1];
    let frame = common::eth_ipv6_icmp(src, dst, 135, 0);
    let decoded = decode(&frame).expect("frame should decode");
    assert_eq!(decoded.ip_version, 6);
    match decoded.transport {
        Transport::Icmp { icmp_type, .. } => assert_eq!(icmp_type, 135),
        _ => panic!("expected ICMP transport"),
    }
}

#[test]
fn ignores_non_first_fragment() {
    let frame = common::eth_ipv4_tcp_fragment([10, 0, 0, 1], [8, 8, 8, 8], 40000, 443);
    assert!(decode(&frame).is_none());
}

#[test]
fn ignores_unknown_ethertype() {
    let frame = common::arp_frame();
    assert!(decode(&frame).is_none());
}
