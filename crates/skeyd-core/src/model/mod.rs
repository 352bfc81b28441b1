// ── Domain model ──
//
// Types shared by the parser, the registry and the reactor.

pub mod category;
pub mod device;
pub mod event;

// ── Re-exports ──────────────────────────────────────────────────────
pub use category::ActionCategory;
pub use device::{ActionKey, Device};
pub use event::ScanEvent;
