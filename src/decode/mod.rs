//! Frame decoding: Ethernet -> (IPv4|IPv6) -> (TCP|UDP|ICMPv4|ICMPv6).
//!
//! Fragments past the first, and unknown ether-types/protocols, are
//! silently ignored rather than surfaced as errors — they are not failures,
//! just frames this recorder has nothing to say about.

use etherparse::{SlicedPacket, TransportSlice};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

#[derive(Debug, Clone)]
pub enum Transport<'a> {
    Tcp {
        src_port: u16,
        dst_port: u16,
        flags: TcpFlags,
        payload: &'a [u8],
    },
    Udp {
        src_port: u16,
        dst_port: u16,
        payload: &'a [u8],
    },
    Icmp {
        icmp_type: u8,
        icmp_code: u8,
    },
}

#[derive(Debug, Clone)]
pub struct DecodedFrame<'a> {
    pub ip_version: u8,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub transport: Transport<'a>,
    pub total_len: usize,
}

/// Decodes one link-layer frame. Returns `None` for anything this recorder
/// does not track (ARP, non-first fragments, unsupported L4 protocols).
pub fn decode(frame: &[u8]) -> Option<DecodedFrame<'_>> {
    let sliced = SlicedPacket::from_ethernet(frame).ok()?;
    let net = sliced.net?;

    let (ip_version, src_ip, dst_ip, is_fragment) = match &net {
        etherparse::NetSlice::Ipv4(ipv4) => {
            let header = ipv4.header();
            (
                4u8,
                IpAddr::V4(header.source_addr()),
                IpAddr::V4(header.destination_addr()),
                header.fragments_offset().unwrap_or(0) != 0,
            )
        }
        etherparse::NetSlice::Ipv6(ipv6) => {
            let header = ipv6.header();
            (
                6u8,
                IpAddr::V6(header.source_addr()),
                IpAddr::V6(header.destination_addr()),
                false,
            )
        }
    };
    if is_fragment {
        return None;
    }

    let transport_slice = sliced.transport?;
    let transport = match transport_slice {
        TransportSlice::Tcp(tcp) => Transport::Tcp {
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
            flags: TcpFlags {
                syn: tcp.syn(),
                ack: tcp.ack(),
                fin: tcp.fin(),
                rst: tcp.rst(),
            },
            payload: tcp.payload(),
        },
        TransportSlice::Udp(udp) => Transport::Udp {
            src_port: udp.source_port(),
            dst_port: udp.destination_port(),
            payload: udp.payload(),
        },
        TransportSlice::Icmpv4(icmp) => {
            let raw = icmp.slice();
            Transport::Icmp {
                icmp_type: *raw.first()?,
                icmp_code: *raw.get(1)?,
            }
        }
        TransportSlice::Icmpv6(icmp) => {
            let raw = icmp.slice();
            Transport::Icmp {
                icmp_type: *raw.first()?,
                icmp_code: *raw.get(1)?,
            }
        }
    };

    Some(DecodedFrame {
        ip_version,
        src_ip,
        dst_ip,
        transport,
        total_len: frame.len(),
    })
}
