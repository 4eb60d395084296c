//! Presentation state for incremental search results.
//!
//! The result list mutates underneath the user while batches stream in;
//! [`ViewList`] keeps the selection valid and the viewport least-surprising
//! across every replacement, and [`RedrawGate`] coalesces the resulting
//! redraw requests into one grant per UI tick.

mod list;
mod redraw;

pub use list::{Anchor, ViewList};
pub use redraw::RedrawGate;
