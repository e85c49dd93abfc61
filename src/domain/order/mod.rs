// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Delivery, Payment, Item)
// - Aggregate (Order, payload decoding and validation)
// - Errors (ValidationError, MalformedMessage)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod aggregate;

pub use value_objects::*;
pub use errors::*;
pub use aggregate::*;
