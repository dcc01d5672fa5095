//! Typed configuration surfaces populated by the invoking program (a CLI,
//! a service wrapper, a test harness) from whatever flag parser it uses.
//!
//! The core never reads the environment or argv itself; it only validates
//! the values it is handed.

use crate::error::NetwatchError;
use std::collections::HashSet;
use std::time::Duration;

/// Parses the `1h` / `24h` / `7d` / `5s` / `0` duration literals named in the
/// invocation surface. `0` means "disabled" and is returned as `Duration::ZERO`.
pub fn parse_duration_literal(input: &str) -> Result<Duration, NetwatchError> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    let (digits, unit) = input.split_at(
        input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len()),
    );
    let value: u64 = digits.parse().map_err(|_| NetwatchError::Config {
        message: format!("invalid duration literal: {input}"),
    })?;
    let seconds = match unit {
        "s" | "" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86400,
        other => {
            return Err(NetwatchError::Config {
                message: format!("unknown duration unit '{other}' in '{input}'"),
            });
        }
    };
    Ok(Duration::from_secs(seconds))
}

/// Traffic classes the filter policy can exclude. See the classification
/// table for how a packet is assigned to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    Tcp,
    Udp,
    Icmp,
    Dns,
    Tls,
    Multicast,
    Broadcast,
    LinkLocal,
    BitTorrent,
    Mdns,
    Ssdp,
    Metadata,
    Ndp,
    Unreachable,
}

impl std::str::FromStr for TrafficClass {
    type Err = NetwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "tcp" => TrafficClass::Tcp,
            "udp" => TrafficClass::Udp,
            "icmp" => TrafficClass::Icmp,
            "dns" => TrafficClass::Dns,
            "tls" => TrafficClass::Tls,
            "multicast" => TrafficClass::Multicast,
            "broadcast" => TrafficClass::Broadcast,
            "linklocal" => TrafficClass::LinkLocal,
            "bittorrent" => TrafficClass::BitTorrent,
            "mdns" => TrafficClass::Mdns,
            "ssdp" => TrafficClass::Ssdp,
            "metadata" => TrafficClass::Metadata,
            "ndp" => TrafficClass::Ndp,
            "unreachable" => TrafficClass::Unreachable,
            other => {
                return Err(NetwatchError::Config {
                    message: format!("unknown traffic class '{other}'"),
                });
            }
        })
    }
}

/// Which flows the Session Manager is allowed to emit events for.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Empty means "all classes allowed".
    pub only: HashSet<TrafficClass>,
    pub exclude: HashSet<TrafficClass>,
    pub exclude_ports: HashSet<u16>,
}

impl FilterConfig {
    pub fn allows(&self, class: TrafficClass) -> bool {
        if !self.only.is_empty() && !self.only.contains(&class) {
            return false;
        }
        !self.exclude.contains(&class)
    }

    pub fn port_excluded(&self, port: u16) -> bool {
        self.exclude_ports.contains(&port)
    }
}

/// Ring sizing and ticker intervals for one or more [`crate::capture::PacketSource`]s.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub interfaces: Vec<String>,
    pub snaplen: i32,
    pub buffer_size: i32,
    pub channel_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub sweep_interval: Duration,
    pub drop_sample_interval: Duration,
    pub tcp_idle_timeout: Duration,
    pub udp_idle_timeout: Duration,
    pub dns_cache_size: usize,
    pub dns_cache_max_age: Duration,
    pub filter: FilterConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interfaces: Vec::new(),
            snaplen: 65535,
            buffer_size: 4 * 1024 * 1024,
            channel_capacity: 1000,
            batch_size: 100,
            flush_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(15),
            drop_sample_interval: Duration::from_secs(30),
            tcp_idle_timeout: Duration::from_secs(120),
            udp_idle_timeout: Duration::from_secs(30),
            dns_cache_size: 4096,
            dns_cache_max_age: Duration::from_secs(600),
            filter: FilterConfig::default(),
        }
    }
}

/// Builder mirroring the parser builder's `with_*` convention.
#[derive(Debug, Clone, Default)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CaptureConfig::default(),
        }
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_interfaces(mut self, interfaces: Vec<String>) -> Self {
        self.config.interfaces = interfaces;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn build(self) -> Result<CaptureConfig, NetwatchError> {
        if self.config.interfaces.is_empty() {
            return Err(NetwatchError::Config {
                message: "at least one interface is required".to_string(),
            });
        }
        if self.config.batch_size == 0 || self.config.batch_size > self.config.channel_capacity {
            return Err(NetwatchError::Config {
                message: "batch_size must be > 0 and <= channel_capacity".to_string(),
            });
        }
        Ok(self.config)
    }
}

/// Parameters for one [`crate::compactor::Compactor::run`] invocation.
#[derive(Debug, Clone)]
pub struct CompactConfig {
    pub older_than: Duration,
    pub dedupe_window: Duration,
    pub hourly_summary: bool,
    pub dry_run: bool,
}

impl Default for CompactConfig {
    fn default() -> Self {
        CompactConfig {
            older_than: Duration::from_secs(3600),
            dedupe_window: Duration::ZERO,
            hourly_summary: false,
            dry_run: false,
        }
    }
}
