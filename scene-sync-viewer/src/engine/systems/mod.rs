//! Runtime systems outside the scene itself.

/// Transfer progress tracking and its native text overlay.
///
/// Keeps the latest progress per transfer and mirrors it into a corner text node.
pub mod transfer_overlay;
