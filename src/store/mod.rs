//! Embedded relational persistence for [`NetworkEvent`] rows.

pub mod filter;

pub use filter::QueryFilter;

use crate::error::{NetwatchError, Result};
use crate::event::{DnsRole, EndReason, EventType, NetworkEvent};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       INTEGER NOT NULL,
    end_time        INTEGER,
    event_type      TEXT NOT NULL,
    interface       TEXT NOT NULL,
    ip_version      INTEGER NOT NULL,
    src_ip          TEXT NOT NULL,
    dst_ip          TEXT NOT NULL,
    src_port        INTEGER NOT NULL,
    dst_port        INTEGER NOT NULL,
    dns_type        TEXT,
    dns_query       TEXT NOT NULL DEFAULT '',
    dns_answers     TEXT NOT NULL DEFAULT '',
    dns_cnames      TEXT NOT NULL DEFAULT '',
    tls_sni         TEXT NOT NULL DEFAULT '',
    hostname        TEXT NOT NULL DEFAULT '',
    dns_age_ms      INTEGER NOT NULL DEFAULT 0,
    duration_ms     INTEGER NOT NULL DEFAULT 0,
    byte_count      INTEGER NOT NULL DEFAULT 0,
    reason          TEXT,
    icmp_type       INTEGER NOT NULL DEFAULT 0,
    icmp_code       INTEGER NOT NULL DEFAULT 0,
    icmp_desc       TEXT NOT NULL DEFAULT '',
    protocol        TEXT NOT NULL DEFAULT '',
    compacted       INTEGER NOT NULL DEFAULT 0,
    original_ids    TEXT NOT NULL DEFAULT '',
    event_count     INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_interface ON events(interface);
CREATE INDEX IF NOT EXISTS idx_events_ip_version ON events(ip_version);
CREATE INDEX IF NOT EXISTS idx_events_src_ip ON events(src_ip);
CREATE INDEX IF NOT EXISTS idx_events_dst_ip ON events(dst_ip);
CREATE INDEX IF NOT EXISTS idx_events_dns_query ON events(dns_query);
CREATE INDEX IF NOT EXISTS idx_events_tls_sni ON events(tls_sni);
";

const BATCH_CHUNK: usize = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub total: i64,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub size_bytes: i64,
}

/// The event table, opened with WAL journaling and a bounded page cache so
/// sustained insert rates do not stall on fsync.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", -2000)?; // ~2MB, negative = KB
        conn.pragma_update(None, "mmap_size", 256 * 1024 * 1024i64)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(EventStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(EventStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn append(&self, event: &NetworkEvent) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        insert_one(&conn, event)
    }

    /// Inserts all events in one transaction per `BATCH_CHUNK`-sized slice;
    /// either a whole chunk commits or none of it does.
    pub fn append_batch(&self, events: &[NetworkEvent]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        for chunk in events.chunks(BATCH_CHUNK) {
            let tx = conn.transaction().map_err(|e| NetwatchError::StoreTransient {
                operation: "append_batch".to_string(),
                reason: e.to_string(),
            })?;
            for event in chunk {
                insert_one(&tx, event)?;
            }
            tx.commit().map_err(|e| NetwatchError::StoreTransient {
                operation: "append_batch commit".to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<NetworkEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from("SELECT * FROM events WHERE 1=1");
        let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(since) = filter.since {
            sql.push_str(" AND timestamp >= ?");
            binds.push(Box::new(since.timestamp_millis()));
        }
        if let Some(until) = filter.until {
            sql.push_str(" AND timestamp <= ?");
            binds.push(Box::new(until.timestamp_millis()));
        }
        if !filter.event_types.is_empty() {
            let placeholders = filter.event_types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND event_type IN ({placeholders})"));
            for et in &filter.event_types {
                binds.push(Box::new(et.as_str().to_string()));
            }
        }
        if let Some(addr) = &filter.address_substring {
            sql.push_str(" AND (src_ip LIKE ? OR dst_ip LIKE ?)");
            let pattern = format!("%{addr}%");
            binds.push(Box::new(pattern.clone()));
            binds.push(Box::new(pattern));
        }
        if let Some(domain) = &filter.domain_substring {
            sql.push_str(" AND (dns_query LIKE ? OR tls_sni LIKE ?)");
            let pattern = format!("%{domain}%");
            binds.push(Box::new(pattern.clone()));
            binds.push(Box::new(pattern));
        }
        if let Some(interface) = &filter.interface {
            sql.push_str(" AND interface = ?");
            binds.push(Box::new(interface.clone()));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?");
        binds.push(Box::new(filter.effective_limit() as i64));
        binds.push(Box::new(filter.offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_event)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
        let first: Option<i64> = conn
            .query_row("SELECT MIN(timestamp) FROM events", [], |r| r.get(0))
            .optional()?
            .flatten();
        let last: Option<i64> = conn
            .query_row("SELECT MAX(timestamp) FROM events", [], |r| r.get(0))
            .optional()?
            .flatten();
        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        Ok(StoreStats {
            total,
            first: first.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            last: last.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            size_bytes,
        })
    }

    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM events WHERE timestamp < ?", params![cutoff.timestamp_millis()])?;
        Ok(affected)
    }

    pub fn reclaim_space(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    pub(crate) fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

fn insert_one(conn: &Connection, event: &NetworkEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (
            timestamp, end_time, event_type, interface, ip_version, src_ip, dst_ip,
            src_port, dst_port, dns_type, dns_query, dns_answers, dns_cnames, tls_sni,
            hostname, dns_age_ms, duration_ms, byte_count, reason, icmp_type, icmp_code,
            icmp_desc, protocol, compacted, original_ids, event_count
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26)",
        params![
            event.timestamp.timestamp_millis(),
            event.end_time.map(|t| t.timestamp_millis()),
            event.event_type.as_str(),
            event.interface,
            event.ip_version,
            event.src_ip,
            event.dst_ip,
            event.src_port,
            event.dst_port,
            event.dns_type.map(|d| d.as_str()),
            event.dns_query,
            event.dns_answers,
            event.dns_cnames,
            event.tls_sni,
            event.hostname,
            event.dns_age_ms,
            event.duration_ms,
            event.byte_count,
            event.reason.map(|r| r.as_str()),
            event.icmp_type,
            event.icmp_code,
            event.icmp_desc,
            event.protocol,
            event.compacted,
            event.original_ids,
            event.event_count,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn row_to_event(row: &Row) -> rusqlite::Result<NetworkEvent> {
    let event_type_str: String = row.get("event_type")?;
    let event_type: EventType = event_type_str.parse().unwrap_or(EventType::Tcp);
    let dns_type_str: Option<String> = row.get("dns_type")?;
    let reason_str: Option<String> = row.get("reason")?;
    let timestamp_ms: i64 = row.get("timestamp")?;
    let end_time_ms: Option<i64> = row.get("end_time")?;

    Ok(NetworkEvent {
        id: row.get("id")?,
        timestamp: Utc.timestamp_millis_opt(timestamp_ms).single().unwrap_or_default(),
        end_time: end_time_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        event_type,
        interface: row.get("interface")?,
        ip_version: row.get("ip_version")?,
        src_ip: row.get("src_ip")?,
        dst_ip: row.get("dst_ip")?,
        src_port: row.get("src_port")?,
        dst_port: row.get("dst_port")?,
        dns_type: dns_type_str.map(|s| match s.as_str() {
            "QUERY" => DnsRole::Query,
            "RESPONSE" => DnsRole::Response,
            _ => DnsRole::Complete,
        }),
        dns_query: row.get("dns_query")?,
        dns_answers: row.get("dns_answers")?,
        dns_cnames: row.get("dns_cnames")?,
        tls_sni: row.get("tls_sni")?,
        hostname: row.get("hostname")?,
        dns_age_ms: row.get("dns_age_ms")?,
        duration_ms: row.get("duration_ms")?,
        byte_count: row.get("byte_count")?,
        reason: reason_str.map(|s| match s.as_str() {
            "FIN" => EndReason::Fin,
            "RST" => EndReason::Rst,
            _ => EndReason::Timeout,
        }),
        icmp_type: row.get("icmp_type")?,
        icmp_code: row.get("icmp_code")?,
        icmp_desc: row.get("icmp_desc")?,
        protocol: row.get("protocol")?,
        compacted: row.get("compacted")?,
        original_ids: row.get("original_ids")?,
        event_count: row.get("event_count")?,
    })
}
