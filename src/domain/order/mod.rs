// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Customer, Address, Payment, Item, Size, OrderItem, ItemStatus)
// - Aggregate (Order) and read filter (OrderFilter)
// - Errors (OrderError)
//
// ============================================================================

pub mod value_objects;
pub mod aggregate;
pub mod errors;

pub use value_objects::*;
pub use aggregate::*;
pub use errors::*;
