//! Offline compaction: pair merges, DNS dedupe, orphan cleanup, and an
//! optional hourly roll-up. Each phase is independently fallible; a failed
//! pair is skipped, not fatal to the run.

use crate::config::CompactConfig;
use crate::error::Result;
use crate::event::{EventType, NetworkEvent};
use crate::store::EventStore;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompactStats {
    pub tcp_pairs_merged: u64,
    pub udp_pairs_merged: u64,
    pub dns_pairs_merged: u64,
    pub dns_deduped: u64,
    pub orphans_removed: u64,
    pub hourly_buckets_created: u64,
    pub bytes_remaining_tcp: i64,
    pub bytes_remaining_udp: i64,
}

pub struct Compactor<'a> {
    store: &'a EventStore,
}

impl<'a> Compactor<'a> {
    pub fn new(store: &'a EventStore) -> Self {
        Compactor { store }
    }

    pub fn run(&self, config: &CompactConfig) -> Result<CompactStats> {
        let older_than = Utc::now() - chrono::Duration::from_std(config.older_than).unwrap_or_default();
        let mut stats = CompactStats::default();

        self.store.with_connection(|conn| {
            stats.tcp_pairs_merged = merge_pairs(conn, older_than, EventType::TcpStart, &[EventType::TcpEnd, EventType::Timeout], EventType::Tcp, config.dry_run)?;
            stats.udp_pairs_merged = merge_pairs(conn, older_than, EventType::UdpStart, &[EventType::UdpEnd], EventType::Udp, config.dry_run)?;
            stats.dns_pairs_merged = merge_dns_pairs(conn, older_than, config.dry_run)?;
            if config.dedupe_window > std::time::Duration::ZERO {
                stats.dns_deduped = dedupe_dns(conn, config.dedupe_window, config.dry_run)?;
            }
            stats.orphans_removed = remove_orphan_ends(conn, older_than, config.dry_run)?;
            if config.hourly_summary {
                stats.hourly_buckets_created = roll_up_hourly(conn, older_than, config.dry_run)?;
            }
            let (tcp_bytes, udp_bytes) = remaining_bytes(conn)?;
            stats.bytes_remaining_tcp = tcp_bytes;
            stats.bytes_remaining_udp = udp_bytes;
            Ok(())
        })?;

        if !config.dry_run {
            self.store.reclaim_space()?;
        }
        Ok(stats)
    }
}

fn merge_pairs(
    conn: &Connection,
    older_than: DateTime<Utc>,
    start_type: EventType,
    end_types: &[EventType],
    merged_type: EventType,
    dry_run: bool,
) -> Result<u64> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, interface, ip_version, src_ip, dst_ip, src_port, dst_port, hostname
         FROM events WHERE event_type = ?1 AND timestamp < ?2 AND compacted = 0 ORDER BY timestamp ASC",
    )?;
    let starts: Vec<(i64, i64, String, u8, String, String, u16, u16, String)> = stmt
        .query_map(params![start_type.as_str(), older_than.timestamp_millis()], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let end_type_list = end_types.iter().map(|t| t.as_str()).collect::<Vec<_>>();
    let placeholders = end_type_list.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let mut merged = 0u64;

    for (start_id, start_ts, interface, ip_version, src_ip, dst_ip, src_port, dst_port, hostname) in starts {
        let window_end = start_ts + 24 * 3600 * 1000;
        let sql = format!(
            "SELECT id, timestamp, duration_ms, byte_count, reason FROM events
             WHERE event_type IN ({placeholders}) AND src_ip = ? AND src_port = ? AND dst_ip = ? AND dst_port = ?
             AND timestamp > ? AND timestamp < ? AND compacted = 0 ORDER BY timestamp ASC LIMIT 1"
        );
        let mut bind_params: Vec<Box<dyn rusqlite::ToSql>> = end_type_list.iter().map(|t| Box::new(t.to_string()) as Box<dyn rusqlite::ToSql>).collect();
        bind_params.push(Box::new(src_ip.clone()));
        bind_params.push(Box::new(src_port));
        bind_params.push(Box::new(dst_ip.clone()));
        bind_params.push(Box::new(dst_port));
        bind_params.push(Box::new(start_ts));
        bind_params.push(Box::new(window_end));
        let bind_refs: Vec<&dyn rusqlite::ToSql> = bind_params.iter().map(|b| b.as_ref()).collect();

        let found: Option<(i64, i64, i64, i64, Option<String>)> = conn
            .query_row(&sql, bind_refs.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .ok();

        let Some((end_id, end_ts, duration_ms, byte_count, reason)) = found else {
            continue;
        };

        if dry_run {
            merged += 1;
            continue;
        }

        let result = (|| -> Result<()> {
            let mut ev = NetworkEvent::new(merged_type, &interface, ip_version);
            ev.timestamp = Utc.timestamp_millis_opt(start_ts).single().unwrap_or_default();
            ev.end_time = Utc.timestamp_millis_opt(end_ts).single();
            ev.src_ip = src_ip.clone();
            ev.dst_ip = dst_ip.clone();
            ev.src_port = src_port;
            ev.dst_port = dst_port;
            ev.duration_ms = duration_ms;
            ev.byte_count = byte_count;
            ev.hostname = hostname.clone();
            ev.reason = reason.as_deref().and_then(|s| match s {
                "FIN" => Some(crate::event::EndReason::Fin),
                "RST" => Some(crate::event::EndReason::Rst),
                "TIMEOUT" => Some(crate::event::EndReason::Timeout),
                _ => None,
            });
            ev.compacted = true;
            ev.original_ids = format!("{start_id},{end_id}");

            conn.execute(
                "INSERT INTO events (timestamp, end_time, event_type, interface, ip_version, src_ip, dst_ip,
                    src_port, dst_port, hostname, duration_ms, byte_count, reason, compacted, original_ids)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
                params![
                    ev.timestamp.timestamp_millis(),
                    ev.end_time.map(|t| t.timestamp_millis()),
                    ev.event_type.as_str(),
                    ev.interface,
                    ev.ip_version,
                    ev.src_ip,
                    ev.dst_ip,
                    ev.src_port,
                    ev.dst_port,
                    ev.hostname,
                    ev.duration_ms,
                    ev.byte_count,
                    ev.reason.map(|r| r.as_str()),
                    ev.compacted,
                    ev.original_ids,
                ],
            )?;
            conn.execute("DELETE FROM events WHERE id IN (?1, ?2)", params![start_id, end_id])?;
            Ok(())
        })();

        match result {
            Ok(()) => merged += 1,
            Err(err) => warn!(start_id, end_id, %err, "pair merge failed, skipping"),
        }
    }

    Ok(merged)
}

fn merge_dns_pairs(conn: &Connection, older_than: DateTime<Utc>, dry_run: bool) -> Result<u64> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, interface, ip_version, src_ip, dst_ip, src_port, dst_port, dns_query
         FROM events WHERE event_type = 'DNS' AND dns_type = 'QUERY' AND timestamp < ?1 AND compacted = 0
         ORDER BY timestamp ASC",
    )?;
    let queries: Vec<(i64, i64, String, u8, String, String, u16, u16, String)> = stmt
        .query_map(params![older_than.timestamp_millis()], |row| {
            Ok((
                row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?,
                row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?,
            ))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut merged = 0u64;
    for (qid, qts, interface, ip_version, src_ip, dst_ip, src_port, dst_port, dns_query) in queries {
        let window_end = qts + 5000;
        let found: Option<(i64, i64, String, String)> = conn
            .query_row(
                "SELECT id, timestamp, dns_answers, dns_cnames FROM events
                 WHERE event_type = 'DNS' AND dns_type = 'RESPONSE' AND dns_query = ?1
                 AND timestamp > ?2 AND timestamp < ?3 AND compacted = 0 ORDER BY timestamp ASC LIMIT 1",
                params![dns_query, qts, window_end],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok();

        let Some((rid, rts, answers, cnames)) = found else {
            continue;
        };
        if dry_run {
            merged += 1;
            continue;
        }

        let result = (|| -> Result<()> {
            conn.execute(
                "INSERT INTO events (timestamp, end_time, event_type, interface, ip_version, src_ip, dst_ip,
                    src_port, dst_port, dns_type, dns_query, dns_answers, dns_cnames, duration_ms, compacted, original_ids)
                 VALUES (?1,?2,'DNS',?3,?4,?5,?6,?7,?8,'COMPLETE',?9,?10,?11,?12,1,?13)",
                params![
                    qts, rts, interface, ip_version, src_ip, dst_ip, src_port, dst_port,
                    dns_query, answers, cnames, (rts - qts).max(0), format!("{qid},{rid}"),
                ],
            )?;
            conn.execute("DELETE FROM events WHERE id IN (?1, ?2)", params![qid, rid])?;
            Ok(())
        })();

        match result {
            Ok(()) => merged += 1,
            Err(err) => warn!(qid, rid, %err, "dns pair merge failed, skipping"),
        }
    }
    Ok(merged)
}

fn dedupe_dns(conn: &Connection, dedupe_window: std::time::Duration, dry_run: bool) -> Result<u64> {
    let window_ms = dedupe_window.as_millis() as i64;
    let mut stmt = conn.prepare(
        "SELECT id, dns_query, timestamp FROM events WHERE event_type = 'DNS'
         ORDER BY dns_query ASC, timestamp ASC",
    )?;
    let rows: Vec<(i64, String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .filter_map(|r| r.ok())
        .collect();

    let mut to_delete = Vec::new();
    let mut last_kept: Option<(&str, i64)> = None;
    let mut last_query: Option<String> = None;
    for (id, query, ts) in &rows {
        let is_same_query = last_query.as_deref() == Some(query.as_str());
        if is_same_query {
            if let Some((_, last_ts)) = last_kept {
                if ts - last_ts < window_ms {
                    to_delete.push(*id);
                    continue;
                }
            }
        }
        last_kept = Some((query.as_str(), *ts));
        last_query = Some(query.clone());
    }
    let _ = last_kept;

    if dry_run || to_delete.is_empty() {
        return Ok(to_delete.len() as u64);
    }
    for id in &to_delete {
        conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
    }
    Ok(to_delete.len() as u64)
}

fn remove_orphan_ends(conn: &Connection, older_than: DateTime<Utc>, dry_run: bool) -> Result<u64> {
    let mut stmt = conn.prepare(
        "SELECT id, event_type, src_ip, src_port, dst_ip, dst_port, timestamp FROM events
         WHERE event_type IN ('TCP_END', 'UDP_END') AND timestamp < ?1",
    )?;
    let ends: Vec<(i64, String, String, u16, String, u16, i64)> = stmt
        .query_map(params![older_than.timestamp_millis()], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut removed = 0u64;
    for (id, event_type, src_ip, src_port, dst_ip, dst_port, ts) in ends {
        let start_type = if event_type == "TCP_END" { "TCP_START" } else { "UDP_START" };
        let has_start: bool = conn
            .query_row(
                "SELECT 1 FROM events WHERE event_type = ?1 AND src_ip = ?2 AND src_port = ?3
                 AND dst_ip = ?4 AND dst_port = ?5 AND timestamp < ?6 LIMIT 1",
                params![start_type, src_ip, src_port, dst_ip, dst_port, ts],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !has_start {
            if !dry_run {
                conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
            }
            removed += 1;
        }
    }
    Ok(removed)
}

fn roll_up_hourly(conn: &Connection, older_than: DateTime<Utc>, dry_run: bool) -> Result<u64> {
    let hour_ms: i64 = 3600 * 1000;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT (timestamp / ?1) * ?1 AS bucket, interface, ip_version FROM events
         WHERE timestamp < ?2 AND event_type != 'HOURLY'",
    )?;
    let buckets: Vec<(i64, String, u8)> = stmt
        .query_map(params![hour_ms, older_than.timestamp_millis()], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .filter_map(|r| r.ok())
        .collect();

    let mut created = 0u64;
    for (bucket_start, interface, ip_version) in buckets {
        let bucket_end = bucket_start + hour_ms;
        let counts: Vec<(String, i64)> = conn
            .prepare(
                "SELECT event_type, COUNT(*) FROM events WHERE interface = ?1 AND ip_version = ?2
                 AND timestamp >= ?3 AND timestamp < ?4 AND event_type != 'HOURLY' GROUP BY event_type",
            )?
            .query_map(params![interface, ip_version, bucket_start, bucket_end], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let tcp = count_for(&counts, &["TCP", "TCP_START", "TCP_END", "TIMEOUT"]);
        let udp = count_for(&counts, &["UDP", "UDP_START", "UDP_END"]);
        let dns = count_for(&counts, &["DNS"]);
        let tls = count_for(&counts, &["TLS_SNI"]);
        let icmp = count_for(&counts, &["ICMP"]);
        let total = tcp + udp + dns + tls + icmp;
        if total == 0 {
            continue;
        }
        if dry_run {
            created += 1;
            continue;
        }

        let protocol = format!("TCP:{tcp},UDP:{udp},DNS:{dns},TLS:{tls},ICMP:{icmp}");
        conn.execute(
            "INSERT INTO events (timestamp, event_type, interface, ip_version, protocol, event_count, compacted)
             VALUES (?1,'HOURLY',?2,?3,?4,?5,1)",
            params![bucket_start, interface, ip_version, protocol, total],
        )?;
        conn.execute(
            "DELETE FROM events WHERE interface = ?1 AND ip_version = ?2 AND timestamp >= ?3 AND timestamp < ?4 AND event_type != 'HOURLY'",
            params![interface, ip_version, bucket_start, bucket_end],
        )?;
        created += 1;
    }
    Ok(created)
}

fn count_for(counts: &[(String, i64)], types: &[&str]) -> i64 {
    counts.iter().filter(|(t, _)| types.contains(&t.as_str())).map(|(_, c)| c).sum()
}

fn remaining_bytes(conn: &Connection) -> Result<(i64, i64)> {
    let tcp: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(byte_count), 0) FROM events WHERE event_type IN ('TCP', 'TCP_START', 'TCP_END')",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);
    let udp: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(byte_count), 0) FROM events WHERE event_type IN ('UDP', 'UDP_START', 'UDP_END')",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);
    Ok((tcp, udp))
}
