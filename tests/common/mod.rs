//! Hand-built link-layer frames for exercising [`netwatch::decode::decode`]
//! without a live capture handle. Checksums are left zeroed: the decoder
//! only reads header fields, never validates checksums.

pub const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_ARP: u16 = 0x0806;

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;
pub const PROTO_ICMP: u8 = 1;
pub const PROTO_ICMPV6: u8 = 58;

fn ethernet_header(ethertype: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(14);
    buf.extend(DST_MAC);
    buf.extend(SRC_MAC);
    buf.extend(ethertype.to_be_bytes());
    buf
}

/// A frame whose EtherType the decoder does not understand (ARP); `decode`
/// must return `None` for it rather than panicking.
pub fn arp_frame() -> Vec<u8> {
    let mut frame = ethernet_header(ETHERTYPE_ARP);
    frame.extend([0u8; 28]);
    frame
}

/// Builds an Ethernet/IPv4 frame. `fragment_offset` in 8-byte units; a
/// non-zero value marks the frame as a non-first fragment.
fn ipv4_header(protocol: u8, src: [u8; 4], dst: [u8; 4], payload_len: usize, fragment_offset: u16) -> Vec<u8> {
    let mut buf = vec![0u8; 20];
    buf[0] = 0x45; // version 4, IHL 5
    buf[1] = 0; // DSCP/ECN
    let total_len = (20 + payload_len) as u16;
    buf[2..4].copy_from_slice(&total_len.to_be_bytes());
    buf[4..6].copy_from_slice(&1u16.to_be_bytes()); // identification
    buf[6..8].copy_from_slice(&fragment_offset.to_be_bytes()); // flags=0, frag offset
    buf[8] = 64; // ttl
    buf[9] = protocol;
    buf[10..12].copy_from_slice(&0u16.to_be_bytes()); // header checksum, unvalidated
    buf[12..16].copy_from_slice(&src);
    buf[16..20].copy_from_slice(&dst);
    buf
}

fn ipv6_header(next_header: u8, src: [u8; 16], dst: [u8; 16], payload_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; 40];
    buf[0] = 0x60; // version 6
    let len = payload_len as u16;
    buf[4..6].copy_from_slice(&len.to_be_bytes());
    buf[6] = next_header;
    buf[7] = 64; // hop limit
    buf[8..24].copy_from_slice(&src);
    buf[24..40].copy_from_slice(&dst);
    buf
}

pub struct TcpFlagBits {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

fn tcp_header(src_port: u16, dst_port: u16, flags: &TcpFlagBits, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20];
    buf[0..2].copy_from_slice(&src_port.to_be_bytes());
    buf[2..4].copy_from_slice(&dst_port.to_be_bytes());
    buf[4..8].copy_from_slice(&1u32.to_be_bytes()); // seq
    buf[8..12].copy_from_slice(&0u32.to_be_bytes()); // ack
    buf[12] = 5 << 4; // data offset, no options
    let mut flag_byte = 0u8;
    if flags.fin {
        flag_byte |= 0x01;
    }
    if flags.rst {
        flag_byte |= 0x04;
    }
    if flags.ack {
        flag_byte |= 0x10;
    }
    if flags.syn {
        flag_byte |= 0x02;
    }
    buf[13] = flag_byte;
    buf[14..16].copy_from_slice(&65535u16.to_be_bytes()); // window
    buf[16..18].copy_from_slice(&0u16.to_be_bytes()); // checksum, unvalidated
    buf[18..20].copy_from_slice(&0u16.to_be_bytes()); // urgent ptr
    buf.extend_from_slice(payload);
    buf
}

fn udp_header(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    buf[0..2].copy_from_slice(&src_port.to_be_bytes());
    buf[2..4].copy_from_slice(&dst_port.to_be_bytes());
    let len = (8 + payload.len()) as u16;
    buf[4..6].copy_from_slice(&len.to_be_bytes());
    buf[6..8].copy_from_slice(&0u16.to_be_bytes()); // checksum, 0 = disabled over IPv4
    buf.extend_from_slice(payload);
    buf
}

fn icmp_header(icmp_type: u8, icmp_code: u8) -> Vec<u8> {
    vec![icmp_type, icmp_code, 0, 0, 0, 0, 0, 0]
}

pub fn eth_ipv4_tcp(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16, flags: TcpFlagBits, payload: &[u8]) -> Vec<u8> {
    let tcp = tcp_header(src_port, dst_port, &flags, payload);
    let mut frame = ethernet_header(ETHERTYPE_IPV4);
    frame.extend(ipv4_header(PROTO_TCP, src, dst, tcp.len(), 0));
    frame.extend(tcp);
    frame
}

pub fn eth_ipv4_tcp_fragment(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
    let tcp = tcp_header(src_port, dst_port, &TcpFlagBits { syn: false, ack: true, fin: false, rst: false }, &[]);
    let mut frame = ethernet_header(ETHERTYPE_IPV4);
    frame.extend(ipv4_header(PROTO_TCP, src, dst, tcp.len(), 185));
    frame.extend(tcp);
    frame
}

pub fn eth_ipv4_udp(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let udp = udp_header(src_port, dst_port, payload);
    let mut frame = ethernet_header(ETHERTYPE_IPV4);
    frame.extend(ipv4_header(PROTO_UDP, src, dst, udp.len(), 0));
    frame.extend(udp);
    frame
}

pub fn eth_ipv4_icmp(src: [u8; 4], dst: [u8; 4], icmp_type: u8, icmp_code: u8) -> Vec<u8> {
    let icmp = icmp_header(icmp_type, icmp_code);
    let mut frame = ethernet_header(ETHERTYPE_IPV4);
    frame.extend(ipv4_header(PROTO_ICMP, src, dst, icmp.len(), 0));
    frame.extend(icmp);
    frame
}

pub fn eth_ipv6_icmp(src: [u8; 16], dst: [u8; 16], icmp_type: u8, icmp_code: u8) -> Vec<u8> {
    let icmp = icmp_header(icmp_type, icmp_code);
    let mut frame = ethernet_header(ETHERTYPE_IPV6);
    frame.extend(ipv6_header(PROTO_ICMPV6, src, dst, icmp.len()));
    frame.extend(icmp);
    frame
}
