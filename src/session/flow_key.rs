use std::net::IpAddr;

/// Direction-sensitive flow identity: `(A -> B)` and `(B -> A)` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub interface: String,
    pub ip_version: u8,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

pub struct FlowState {
    pub first_seen: chrono::DateTime<chrono::Utc>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub byte_count: i64,
    pub hostname: String,
    pub dns_age_ms: i64,
    pub tls_sni_emitted: bool,
}

impl FlowState {
    pub fn new(now: chrono::DateTime<chrono::Utc>, hostname: String, dns_age_ms: i64) -> Self {
        FlowState {
            first_seen: now,
            last_seen: now,
            byte_count: 0,
            hostname,
            dns_age_ms,
            tls_sni_emitted: false,
        }
    }
}
