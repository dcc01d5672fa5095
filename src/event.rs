//! The single persisted entity: [`NetworkEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag distinguishing the kind of occurrence a row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    TcpStart,
    TcpEnd,
    UdpStart,
    UdpEnd,
    Dns,
    TlsSni,
    Icmp,
    Timeout,
    /// Compacted TCP pair
    Tcp,
    /// Compacted UDP pair
    Udp,
    /// Post-compaction roll-up bucket
    Hourly,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TcpStart => "TCP_START",
            EventType::TcpEnd => "TCP_END",
            EventType::UdpStart => "UDP_START",
            EventType::UdpEnd => "UDP_END",
            EventType::Dns => "DNS",
            EventType::TlsSni => "TLS_SNI",
            EventType::Icmp => "ICMP",
            EventType::Timeout => "TIMEOUT",
            EventType::Tcp => "TCP",
            EventType::Udp => "UDP",
            EventType::Hourly => "HOURLY",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "TCP_START" => EventType::TcpStart,
            "TCP_END" => EventType::TcpEnd,
            "UDP_START" => EventType::UdpStart,
            "UDP_END" => EventType::UdpEnd,
            "DNS" => EventType::Dns,
            "TLS_SNI" => EventType::TlsSni,
            "ICMP" => EventType::Icmp,
            "TIMEOUT" => EventType::Timeout,
            "TCP" => EventType::Tcp,
            "UDP" => EventType::Udp,
            "HOURLY" => EventType::Hourly,
            other => return Err(format!("unknown event type: {other}")),
        })
    }
}

/// The kind of DNS row: a bare query, a bare response, or a compacted pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRole {
    Query,
    Response,
    Complete,
}

impl DnsRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsRole::Query => "QUERY",
            DnsRole::Response => "RESPONSE",
            DnsRole::Complete => "COMPLETE",
        }
    }
}

/// Why a TCP flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    Fin,
    Rst,
    Timeout,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Fin => "FIN",
            EndReason::Rst => "RST",
            EndReason::Timeout => "TIMEOUT",
        }
    }
}

/// A single row of the event table.
///
/// `id` is `None` until the row has been assigned one by [`crate::store::EventStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub event_type: EventType,
    pub interface: String,
    pub ip_version: u8,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub dns_type: Option<DnsRole>,
    pub dns_query: String,
    pub dns_answers: String,
    pub dns_cnames: String,
    pub tls_sni: String,
    pub hostname: String,
    pub dns_age_ms: i64,
    pub duration_ms: i64,
    pub byte_count: i64,
    pub reason: Option<EndReason>,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub icmp_desc: String,
    pub protocol: String,
    pub compacted: bool,
    pub original_ids: String,
    pub event_count: i64,
}

impl NetworkEvent {
    /// A bare event with every optional field at its zero value, ready to
    /// have the fields relevant to one event type filled in.
    pub fn new(event_type: EventType, interface: impl Into<String>, ip_version: u8) -> Self {
        let now = crate::time::now_ms();
        NetworkEvent {
            id: None,
            timestamp: now,
            end_time: None,
            event_type,
            interface: interface.into(),
            ip_version,
            src_ip: String::new(),
            dst_ip: String::new(),
            src_port: 0,
            dst_port: 0,
            dns_type: None,
            dns_query: String::new(),
            dns_answers: String::new(),
            dns_cnames: String::new(),
            tls_sni: String::new(),
            hostname: String::new(),
            dns_age_ms: 0,
            duration_ms: 0,
            byte_count: 0,
            reason: None,
            icmp_type: 0,
            icmp_code: 0,
            icmp_desc: String::new(),
            protocol: String::new(),
            compacted: false,
            original_ids: String::new(),
            event_count: 1,
        }
    }
}
