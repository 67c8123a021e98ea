// ============================================================================
// Read-Through Cache
// ============================================================================
//
// Bounded, time-expiring key → value store in front of the order store.
// Entries are evicted by TTL expiry (checked on read) or LRU pressure
// (checked on insert), never by writes.
//
// ============================================================================

mod lru;

pub use lru::LruCache;
