// ============================================================================
// Cache Module - In-process order cache
// ============================================================================
//
// A derived, possibly stale copy of store state used to serve reads without
// a database round trip. The store stays the source of truth.
//
// ============================================================================

mod order_cache;

pub use order_cache::{OrderCache, WarmUpError, WARM_UP_TIMEOUT};
