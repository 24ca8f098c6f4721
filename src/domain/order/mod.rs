// ============================================================================
// Order Domain
// ============================================================================
//
// - value_objects.rs - Delivery, Payment, Item
// - aggregate.rs     - Order and its validation
// - errors.rs        - ValidationError
// - service.rs       - OrderService (create / get / list / health)
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod service;
pub mod value_objects;

pub use aggregate::{truncate_micros, Order};
pub use errors::ValidationError;
pub use service::{OrderService, OrderServiceError};
pub use value_objects::{Delivery, Item, Payment};
