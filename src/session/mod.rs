//! The flow-keyed state machine: turns decoded frames into [`NetworkEvent`]s.

mod dns_cache;
mod flow_key;

pub use dns_cache::DnsCache;
pub use flow_key::{FlowKey, FlowState};

use crate::classify::{classify_address, classify_ports, is_ndp, is_unreachable};
use crate::config::{CaptureConfig, TrafficClass};
use crate::decode::{DecodedFrame, Transport};
use crate::dns;
use crate::event::{DnsRole, EndReason, EventType, NetworkEvent};
use crate::time::{duration_ms, now_ms};
use crate::tls;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Owns all per-flow state. Safe to share across Packet Source tasks behind
/// an `Arc`; internal maps are guarded by one mutex, matching the "single
/// write mutex, optionally sharded" policy the concurrency model allows.
pub struct SessionManager {
    tcp_flows: Mutex<HashMap<FlowKey, FlowState>>,
    udp_flows: Mutex<HashMap<FlowKey, FlowState>>,
    dns_cache: Mutex<DnsCache>,
    config: CaptureConfig,
    events: mpsc::Sender<NetworkEvent>,
}

impl SessionManager {
    pub fn new(config: CaptureConfig, events: mpsc::Sender<NetworkEvent>) -> Self {
        let dns_cache = DnsCache::new(config.dns_cache_size, config.dns_cache_max_age);
        SessionManager {
            tcp_flows: Mutex::new(HashMap::new()),
            udp_flows: Mutex::new(HashMap::new()),
            dns_cache: Mutex::new(dns_cache),
            config,
            events,
        }
    }

    fn emit(&self, event: NetworkEvent) {
        if self.events.try_send(event).is_err() {
            warn!("event channel full or closed; event dropped at session layer");
        }
    }

    fn allowed(&self, class: TrafficClass, src_port: u16, dst_port: u16, src_ip: std::net::IpAddr, dst_ip: std::net::IpAddr) -> bool {
        if !self.config.filter.allows(class) {
            return false;
        }
        if self.config.filter.port_excluded(src_port) || self.config.filter.port_excluded(dst_port) {
            return false;
        }
        for c in classify_address(src_ip).into_iter().chain(classify_address(dst_ip)) {
            if !self.config.filter.allows(c) {
                return false;
            }
        }
        for c in classify_ports(src_port, dst_port) {
            if !self.config.filter.allows(c) {
                return false;
            }
        }
        true
    }

    /// Processes one decoded frame from `interface`, emitting zero or more events.
    pub fn handle_frame(&self, interface: &str, frame: &DecodedFrame<'_>) {
        match &frame.transport {
            Transport::Tcp {
                src_port,
                dst_port,
                flags,
                payload,
            } => self.handle_tcp(interface, frame, *src_port, *dst_port, *flags, payload),
            Transport::Udp {
                src_port,
                dst_port,
                payload,
            } => self.handle_udp(interface, frame, *src_port, *dst_port, payload),
            Transport::Icmp {
                icmp_type,
                icmp_code,
            } => self.handle_icmp(interface, frame, *icmp_type, *icmp_code),
        }
    }

    fn handle_tcp(
        &self,
        interface: &str,
        frame: &DecodedFrame<'_>,
        src_port: u16,
        dst_port: u16,
        flags: crate::decode::TcpFlags,
        payload: &[u8],
    ) {
        if !self.allowed(TrafficClass::Tcp, src_port, dst_port, frame.src_ip, frame.dst_ip) {
            return;
        }
        let key = FlowKey {
            interface: interface.to_string(),
            ip_version: frame.ip_version,
            src_ip: frame.src_ip,
            src_port,
            dst_ip: frame.dst_ip,
            dst_port,
        };
        let now = now_ms();
        let mut flows = self.tcp_flows.lock().unwrap();

        if flags.syn && !flags.ack && !flows.contains_key(&key) {
            let (hostname, age_ms) = self
                .dns_cache
                .lock()
                .unwrap()
                .lookup(&frame.dst_ip)
                .unwrap_or_default();
            flows.insert(key.clone(), FlowState::new(now, hostname.clone(), age_ms));
            let mut ev = NetworkEvent::new(EventType::TcpStart, interface, frame.ip_version);
            ev.timestamp = now;
            ev.src_ip = key.src_ip.to_string();
            ev.dst_ip = key.dst_ip.to_string();
            ev.src_port = key.src_port;
            ev.dst_port = key.dst_port;
            ev.hostname = hostname;
            ev.dns_age_ms = age_ms;
            self.emit(ev);
        }

        let Some(state) = flows.get_mut(&key) else {
            drop(flows);
            if !payload.is_empty() && payload[0] == 0x16 {
                self.maybe_emit_tls(interface, frame, &key, payload);
            }
            return;
        };
        state.last_seen = now;
        state.byte_count += frame.total_len as i64;
        let tls_needed = !state.tls_sni_emitted && !payload.is_empty() && payload[0] == 0x16;
        let hostname = state.hostname.clone();

        if flags.fin || flags.rst {
            let first_seen = state.first_seen;
            let byte_count = state.byte_count;
            flows.remove(&key);
            drop(flows);
            let mut ev = NetworkEvent::new(EventType::TcpEnd, interface, frame.ip_version);
            ev.timestamp = now;
            ev.end_time = Some(now);
            ev.src_ip = key.src_ip.to_string();
            ev.dst_ip = key.dst_ip.to_string();
            ev.src_port = key.src_port;
            ev.dst_port = key.dst_port;
            ev.duration_ms = duration_ms(first_seen, now);
            ev.byte_count = byte_count;
            ev.reason = Some(if flags.rst { EndReason::Rst } else { EndReason::Fin });
            ev.hostname = hostname;
            self.emit(ev);
        } else {
            drop(flows);
        }

        if tls_needed {
            self.maybe_emit_tls(interface, frame, &key, payload);
        }
    }

    fn maybe_emit_tls(&self, interface: &str, frame: &DecodedFrame<'_>, key: &FlowKey, payload: &[u8]) {
        if !self.config.filter.allows(TrafficClass::Tls) {
            return;
        }
        let Some(sni) = tls::parse_sni(payload) else {
            return;
        };
        if let Some(state) = self.tcp_flows.lock().unwrap().get_mut(key) {
            if state.tls_sni_emitted {
                return;
            }
            state.tls_sni_emitted = true;
        }
        let mut ev = NetworkEvent::new(EventType::TlsSni, interface, frame.ip_version);
        ev.src_ip = key.src_ip.to_string();
        ev.dst_ip = key.dst_ip.to_string();
        ev.src_port = key.src_port;
        ev.dst_port = key.dst_port;
        ev.tls_sni = sni;
        self.emit(ev);
    }

    fn handle_udp(&self, interface: &str, frame: &DecodedFrame<'_>, src_port: u16, dst_port: u16, payload: &[u8]) {
        if !self.allowed(TrafficClass::Udp, src_port, dst_port, frame.src_ip, frame.dst_ip) {
            return;
        }
        let key = FlowKey {
            interface: interface.to_string(),
            ip_version: frame.ip_version,
            src_ip: frame.src_ip,
            src_port,
            dst_ip: frame.dst_ip,
            dst_port,
        };
        let now = now_ms();
        {
            let mut flows = self.udp_flows.lock().unwrap();
            if let std::collections::hash_map::Entry::Vacant(v) = flows.entry(key.clone()) {
                v.insert(FlowState::new(now, String::new(), 0));
                let mut ev = NetworkEvent::new(EventType::UdpStart, interface, frame.ip_version);
                ev.timestamp = now;
                ev.src_ip = key.src_ip.to_string();
                ev.dst_ip = key.dst_ip.to_string();
                ev.src_port = key.src_port;
                ev.dst_port = key.dst_port;
                self.emit(ev);
            } else if let Some(state) = flows.get_mut(&key) {
                state.last_seen = now;
                state.byte_count += frame.total_len as i64;
            }
        }

        if (src_port == 53 || dst_port == 53) && self.config.filter.allows(TrafficClass::Dns) {
            self.handle_dns(interface, frame, &key, payload);
        }
    }

    fn handle_dns(&self, interface: &str, frame: &DecodedFrame<'_>, key: &FlowKey, payload: &[u8]) {
        let msg = match dns::parse(payload) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, hex = %hex::encode(&payload[..payload.len().min(64)]), "dns parse failed");
                return;
            }
        };
        if msg.questions.is_empty() {
            return;
        }
        let question = &msg.questions[0];
        let addresses = msg.addresses();
        let cnames = msg.cnames();

        if msg.is_response {
            let learned_at = now_ms();
            for addr in &addresses {
                if let Ok(parsed) = addr.parse() {
                    self.dns_cache
                        .lock()
                        .unwrap()
                        .insert(parsed, question.name.clone());
                }
            }
            let _ = learned_at;
        }

        let mut ev = NetworkEvent::new(EventType::Dns, interface, frame.ip_version);
        ev.src_ip = key.src_ip.to_string();
        ev.dst_ip = key.dst_ip.to_string();
        ev.src_port = key.src_port;
        ev.dst_port = key.dst_port;
        ev.dns_type = Some(if msg.is_response {
            DnsRole::Response
        } else {
            DnsRole::Query
        });
        ev.dns_query = question.name.clone();
        ev.dns_answers = addresses.join(",");
        ev.dns_cnames = cnames.join(",");
        self.emit(ev);
    }

    fn handle_icmp(&self, interface: &str, frame: &DecodedFrame<'_>, icmp_type: u8, icmp_code: u8) {
        if !self.config.filter.allows(TrafficClass::Icmp) {
            return;
        }
        if is_unreachable(frame.ip_version, icmp_type) && !self.config.filter.allows(TrafficClass::Unreachable) {
            return;
        }
        if is_ndp(frame.ip_version, icmp_type) && !self.config.filter.allows(TrafficClass::Ndp) {
            return;
        }
        let mut ev = NetworkEvent::new(EventType::Icmp, interface, frame.ip_version);
        ev.src_ip = frame.src_ip.to_string();
        ev.dst_ip = frame.dst_ip.to_string();
        ev.icmp_type = icmp_type;
        ev.icmp_code = icmp_code;
        ev.icmp_desc = icmp_description(frame.ip_version, icmp_type, icmp_code);
        self.emit(ev);
    }

    /// One sweep over both flow maps, evicting idle flows and emitting the
    /// synthetic TIMEOUT/UDP_END events they produce.
    pub fn sweep(&self) {
        let now = now_ms();
        self.sweep_tcp(now);
        self.sweep_udp(now);
    }

    fn sweep_tcp(&self, now: chrono::DateTime<chrono::Utc>) {
        let idle = self.config.tcp_idle_timeout;
        let mut expired = Vec::new();
        {
            let mut flows = self.tcp_flows.lock().unwrap();
            flows.retain(|key, state| {
                let stale = duration_ms(state.last_seen, now) as u64 > idle.as_millis() as u64;
                if stale {
                    expired.push((key.clone(), state.first_seen, state.last_seen, state.byte_count, state.hostname.clone()));
                }
                !stale
            });
        }
        for (key, first_seen, last_seen, byte_count, hostname) in expired {
            let mut ev = NetworkEvent::new(EventType::Timeout, &key.interface, key.ip_version);
            ev.timestamp = first_seen;
            ev.end_time = Some(last_seen);
            ev.src_ip = key.src_ip.to_string();
            ev.dst_ip = key.dst_ip.to_string();
            ev.src_port = key.src_port;
            ev.dst_port = key.dst_port;
            ev.duration_ms = duration_ms(first_seen, last_seen);
            ev.byte_count = byte_count;
            ev.reason = Some(EndReason::Timeout);
            ev.hostname = hostname;
            self.emit(ev);
        }
    }

    fn sweep_udp(&self, now: chrono::DateTime<chrono::Utc>) {
        let idle = self.config.udp_idle_timeout;
        let mut expired = Vec::new();
        {
            let mut flows = self.udp_flows.lock().unwrap();
            flows.retain(|key, state| {
                let stale = duration_ms(state.last_seen, now) as u64 > idle.as_millis() as u64;
                if stale {
                    expired.push((key.clone(), state.first_seen, state.last_seen, state.byte_count));
                }
                !stale
            });
        }
        for (key, first_seen, last_seen, byte_count) in expired {
            let mut ev = NetworkEvent::new(EventType::UdpEnd, &key.interface, key.ip_version);
            ev.timestamp = first_seen;
            ev.end_time = Some(last_seen);
            ev.src_ip = key.src_ip.to_string();
            ev.dst_ip = key.dst_ip.to_string();
            ev.src_port = key.src_port;
            ev.dst_port = key.dst_port;
            ev.duration_ms = duration_ms(first_seen, last_seen);
            ev.byte_count = byte_count;
            self.emit(ev);
        }
    }

    /// Forces every outstanding flow closed, used during graceful shutdown
    /// so the store reflects a clean snapshot (no flow left half-open).
    pub fn drain_all(&self) {
        let now = now_ms();
        let tcp: Vec<_> = self.tcp_flows.lock().unwrap().drain().collect();
        for (key, state) in tcp {
            let mut ev = NetworkEvent::new(EventType::Timeout, &key.interface, key.ip_version);
            ev.timestamp = state.first_seen;
            ev.end_time = Some(now);
            ev.src_ip = key.src_ip.to_string();
            ev.dst_ip = key.dst_ip.to_string();
            ev.src_port = key.src_port;
            ev.dst_port = key.dst_port;
            ev.duration_ms = duration_ms(state.first_seen, now);
            ev.byte_count = state.byte_count;
            ev.reason = Some(EndReason::Timeout);
            ev.hostname = state.hostname;
            self.emit(ev);
        }
        let udp: Vec<_> = self.udp_flows.lock().unwrap().drain().collect();
        for (key, state) in udp {
            let mut ev = NetworkEvent::new(EventType::UdpEnd, &key.interface, key.ip_version);
            ev.timestamp = state.first_seen;
            ev.end_time = Some(now);
            ev.src_ip = key.src_ip.to_string();
            ev.dst_ip = key.dst_ip.to_string();
            ev.src_port = key.src_port;
            ev.dst_port = key.dst_port;
            ev.duration_ms = duration_ms(state.first_seen, now);
            ev.byte_count = state.byte_count;
            self.emit(ev);
        }
    }
}

/// Short human-readable description for a (type, code) pair. Closed for the
/// notices the classifier table names; falls back to a raw numeric label
/// for anything else so unknown notices are still recorded, not dropped.
fn icmp_description(ip_version: u8, icmp_type: u8, icmp_code: u8) -> String {
    match (ip_version, icmp_type, icmp_code) {
        (4, 0, _) => "echo reply".to_string(),
        (4, 3, _) => "destination unreachable".to_string(),
        (4, 5, _) => "redirect".to_string(),
        (4, 8, _) => "echo request".to_string(),
        (4, 11, _) => "time exceeded".to_string(),
        (6, 1, _) => "destination unreachable".to_string(),
        (6, 2, _) => "packet too big".to_string(),
        (6, 3, _) => "time exceeded".to_string(),
        (6, 128, _) => "echo request".to_string(),
        (6, 129, _) => "echo reply".to_string(),
        (6, 133, _) => "router solicitation".to_string(),
        (6, 134, _) => "router advertisement".to_string(),
        (6, 135, _) => "neighbor solicitation".to_string(),
        (6, 136, _) => "neighbor advertisement".to_string(),
        _ => format!("ICMP type={icmp_type} code={icmp_code}"),
    }
}
