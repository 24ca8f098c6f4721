// ============================================================================
// Domain Layer
// ============================================================================
//
// The order aggregate, its validation rules and the service that moves it
// between the store, the cache and the notification topic.
//
// ============================================================================

pub mod order;
