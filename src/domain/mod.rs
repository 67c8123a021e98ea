// ============================================================================
// Domain Layer
// ============================================================================
//
// The order aggregate and the rules that are independent of storage and
// transport: value objects, status mapping, read filters and errors.
//
// ============================================================================

pub mod order;
