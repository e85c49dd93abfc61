// ============================================================================
// Domain Layer
// ============================================================================
//
// The Order aggregate and the rules a feed payload must satisfy before it is
// persisted. No I/O happens in this layer.
//
// ============================================================================

pub mod order;
