//! skeyd-core: UDP scan-key notification reactor, device registry and child supervision.

pub mod config;
pub mod error;
pub mod inflight;
pub mod liveness;
pub mod model;
pub mod protocol;
pub mod reactor;
pub mod registry;
pub mod scheduler;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DeviceConfig, DispatcherConfig};
pub use error::{CoreError, EntryError};
pub use inflight::InFlight;
pub use liveness::LivenessMarker;
pub use model::{ActionCategory, Device, ScanEvent};
pub use protocol::notification::{Rejection, parse_notification};
pub use protocol::registration::RegistrationRequest;
pub use reactor::{DatagramOutcome, Dispatcher, Reactor, ReactorState};
pub use registry::DeviceRegistry;
pub use scheduler::RegistrationScheduler;
pub use supervisor::{Completion, ExitOutcome, ProcessId, ProcessKind, ProcessSupervisor};
