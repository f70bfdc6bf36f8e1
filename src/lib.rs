//! seatlink - session and device arbitration for display servers
//!
//! Mediates between an unprivileged display-server process and logind,
//! the privileged session broker: it takes control of the graphical
//! session, leases GPU and input device nodes, and pauses/unpauses the
//! renderer in lock-step with VT switches.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │           SessionController                 │
//! ├─────────────────────────────────────────────┤
//! │  logind (zbus)  →  DeviceLeaseClient        │
//! │                          ↓                  │
//! │  PrimaryAdapter (udev) → RendererHandoff    │
//! │                          ↓                  │
//! │  libinput open/close ←  device leases       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The core is single-threaded and event-driven: all broker calls are
//! blocking, and the one asynchronous event (the session's `Active`
//! property change) is consumed by the embedding event loop through
//! [`SessionController::dispatch_activity_change`].

pub mod adapter;
pub mod device;
pub mod error;
pub mod input;
pub mod logind;
pub mod render;
pub mod session;

pub use adapter::{find_primary_adapter, select_adapter, AdapterCandidate};
pub use device::{DeviceId, DeviceLease, DeviceLeaseClient};
pub use error::{Error, Result};
pub use input::{InputHandoff, LeasedDeviceInterface};
pub use render::{RenderBackend, RendererHandoff};
pub use session::{SessionController, SessionOptions};
