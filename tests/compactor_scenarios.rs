//! Store + compactor scenarios driven directly against crafted rows, the
//! same way the compactor's own unit test seeds fixtures.

use chrono::{TimeZone, Utc};
use netwatch::compactor::Compactor;
use netwatch::config::CompactConfig;
use netwatch::event::{DnsRole, EventType, NetworkEvent};
use netwatch::store::{EventStore, QueryFilter};
use std::time::Duration;

fn event_at(event_type: EventType, ts_ms: i64) -> NetworkEvent {
    let mut ev = NetworkEvent::new(event_type, "eth0", 4);
    ev.timestamp = Utc.timestamp_millis_opt(ts_ms).single().unwrap();
    ev
}

#[test]
fn dns_query_response_pair_merges_into_complete() {
    let store = EventStore::open_in_memory().unwrap();

    let mut query = event_at(EventType::Dns, 0);
    query.dns_type = Some(DnsRole::Query);
    query.dns_query = "example.com".to_string();
    query.src_ip = "192.168.1.2".to_string();
    query.src_port = 53001;
    query.dst_ip = "8.8.8.8".to_string();
    query.dst_port = 53;
    store.append(&query).unwrap();

    let mut response = event_at(EventType::Dns, 40);
    response.dns_type = Some(DnsRole::Response);
    response.dns_query = "example.com".to_string();
    response.dns_answers = "93.184.216.34".to_string();
    response.src_ip = "8.8.8.8".to_string();
    response.src_port = 53;
    response.dst_ip = "192.168.1.2".to_string();
    response.dst_port = 53001;
    store.append(&response).unwrap();

    std::thread::sleep(Duration::from_millis(10));
    let stats = Compactor::new(&store)
        .run(&CompactConfig {
            older_than: Duration::ZERO,
            dedupe_window: Duration::ZERO,
            hourly_summary: false,
            dry_run: false,
        })
        .unwrap();
    assert_eq!(stats.dns_pairs_merged, 1);

    let mut filter = QueryFilter::new();
    filter.event_types = vec![EventType::Dns];
    let rows = store.query(&filter).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dns_type, Some(DnsRole::Complete));
    assert_eq!(rows[0].dns_answers, "93.184.216.34");
    assert_eq!(rows[0].duration_ms, 40);
}

#[test]
fn dns_dedupe_keeps_one_survivor_per_five_second_window() {
    let store = EventStore::open_in_memory().unwrap();
    for i in 0..10 {
        let mut ev = event_at(EventType::Dns, i * 1000);
        ev.dns_type = Some(DnsRole::Query);
        ev.dns_query = "api.x".to_string();
        store.append(&ev).unwrap();
    }

    let stats = Compactor::new(&store)
        .run(&CompactConfig {
            // fixture timestamps sit at the unix epoch; any real-world cutoff clears them
            older_than: Duration::from_millis(1),
            dedupe_window: Duration::from_secs(5),
            hourly_summary: false,
            dry_run: false,
        })
        .unwrap();
    assert_eq!(stats.dns_deduped, 8);

    let mut filter = QueryFilter::new();
    filter.event_types = vec![EventType::Dns];
    let rows = store.query(&filter).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn hourly_summary_rolls_up_bucket_and_deletes_originals() {
    let store = EventStore::open_in_memory().unwrap();
    let hour_start = 10 * 3_600_000i64;

    // Only START-flavored TCP/UDP rows: a mix of START and END sharing the
    // same (empty) address tuple would let phase 1/2 pair-merge them before
    // the rollup ever counts them, which is a different scenario.
    let counts = [
        (EventType::TcpStart, 100),
        (EventType::UdpStart, 50),
        (EventType::Dns, 200),
        (EventType::TlsSni, 10),
        (EventType::Icmp, 5),
    ];
    for (event_type, count) in counts {
        for i in 0..count {
            store.append(&event_at(event_type, hour_start + i)).unwrap();
        }
    }

    let stats = Compactor::new(&store)
        .run(&CompactConfig {
            older_than: Duration::ZERO,
            dedupe_window: Duration::ZERO,
            hourly_summary: true,
            dry_run: false,
        })
        .unwrap();
    assert_eq!(stats.hourly_buckets_created, 1);

    let mut filter = QueryFilter::new();
    filter.event_types = vec![EventType::Hourly];
    let rows = store.query(&filter).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_count, 365);
    assert_eq!(rows[0].protocol, "TCP:100,UDP:50,DNS:200,TLS:10,ICMP:5");

    let mut remaining = QueryFilter::new();
    remaining.limit = 100;
    remaining.event_types = vec![
        EventType::TcpStart,
        EventType::TcpEnd,
        EventType::UdpStart,
        EventType::UdpEnd,
        EventType::Dns,
        EventType::TlsSni,
        EventType::Icmp,
    ];
    assert!(store.query(&remaining).unwrap().is_empty());
}

#[test]
fn orphan_tcp_end_without_start_is_removed() {
    let store = EventStore::open_in_memory().unwrap();
    let mut end = event_at(EventType::TcpEnd, 0);
    end.src_ip = "10.0.0.9".to_string();
    end.dst_ip = "1.1.1.1".to_string();
    end.src_port = 41000;
    end.dst_port = 443;
    store.append(&end).unwrap();

    std::thread::sleep(Duration::from_millis(10));
    let stats = Compactor::new(&store)
        .run(&CompactConfig {
            older_than: Duration::ZERO,
            dedupe_window: Duration::ZERO,
            hourly_summary: false,
            dry_run: false,
        })
        .unwrap();
    assert_eq!(stats.orphans_removed, 1);

    let stats_after = store.stats().unwrap();
    assert_eq!(stats_after.total, 0);
}

#[test]
fn dry_run_leaves_store_untouched() {
    let store = EventStore::open_in_memory().unwrap();
    let mut start = event_at(EventType::TcpStart, 0);
    start.src_ip = "10.0.0.1".to_string();
    start.dst_ip = "8.8.8.8".to_string();
    start.src_port = 40000;
    start.dst_port = 443;
    let mut end = event_at(EventType::TcpEnd, 5000);
    end.src_ip = "10.0.0.1".to_string();
    end.dst_ip = "8.8.8.8".to_string();
    end.src_port = 40000;
    end.dst_port = 443;
    store.append(&start).unwrap();
    store.append(&end).unwrap();

    std::thread::sleep(Duration::from_millis(10));
    let stats = Compactor::new(&store)
        .run(&CompactConfig {
            older_than: Duration::ZERO,
            dedupe_window: Duration::ZERO,
            hourly_summary: false,
            dry_run: true,
        })
        .unwrap();
    assert_eq!(stats.tcp_pairs_merged, 1);

    let total = store.stats().unwrap().total;
    assert_eq!(total, 2, "dry run must not insert or delete rows");
}
