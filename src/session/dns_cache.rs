//! Resolved-address -> hostname cache used to tag new TCP flows.
//!
//! Generalizes the template TTL/LRU cache pattern: entries are evicted both
//! by LRU pressure (bounded size) and by a hard max age, whichever comes
//! first.

use lru::LruCache;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry {
    hostname: String,
    learned_at: Instant,
}

pub struct DnsCache {
    entries: LruCache<IpAddr, Entry>,
    max_age: Duration,
}

impl DnsCache {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        DnsCache {
            entries: LruCache::new(capacity),
            max_age,
        }
    }

    pub fn insert(&mut self, addr: IpAddr, hostname: String) {
        self.entries.put(
            addr,
            Entry {
                hostname,
                learned_at: Instant::now(),
            },
        );
    }

    /// Returns the cached hostname and its age in milliseconds, if present
    /// and not older than `max_age`. A hit beyond max_age is treated as a
    /// miss and evicted.
    pub fn lookup(&mut self, addr: &IpAddr) -> Option<(String, i64)> {
        let expired = match self.entries.peek(addr) {
            Some(entry) => entry.learned_at.elapsed() > self.max_age,
            None => return None,
        };
        if expired {
            self.entries.pop(addr);
            return None;
        }
        let entry = self.entries.get(addr)?;
        Some((entry.hostname.clone(), entry.learned_at.elapsed().as_millis() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn hits_within_age() {
        let mut cache = DnsCache::new(10, Duration::from_secs(60));
        let addr: IpAddr = "93.184.216.34".parse().unwrap();
        cache.insert(addr, "example.com".to_string());
        let (hostname, age_ms) = cache.lookup(&addr).unwrap();
        assert_eq!(hostname, "example.com");
        assert!(age_ms >= 0);
    }

    #[test]
    fn expires_past_max_age() {
        let mut cache = DnsCache::new(10, Duration::from_millis(10));
        let addr: IpAddr = "93.184.216.34".parse().unwrap();
        cache.insert(addr, "example.com".to_string());
        thread::sleep(Duration::from_millis(30));
        assert!(cache.lookup(&addr).is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = DnsCache::new(1, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        cache.insert(a, "a.example".to_string());
        cache.insert(b, "b.example".to_string());
        assert!(cache.lookup(&a).is_none());
        assert!(cache.lookup(&b).is_some());
    }
}
