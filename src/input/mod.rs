//! Input subsystem seams
//!
//! Two directions meet here: the input subsystem asks us to open and
//! close device nodes ([`LeasedDeviceInterface`], handed to libinput as
//! its `LibinputInterface`), and we ask the input subsystem to reclaim
//! or release its devices around session activation changes
//! ([`InputHandoff`]).

use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;

use input::LibinputInterface;
use log::warn;

use crate::device::{DeviceId, DeviceLeaseClient};

/// The input subsystem's reaction to session activation changes.
///
/// `release_devices` is invoked before the renderer pauses so no input
/// events race a frozen clock; `reclaim_devices` is invoked before the
/// renderer unpauses so the forced redraw sees restored input state.
pub trait InputHandoff {
    fn reclaim_devices(&mut self);
    fn release_devices(&mut self);
}

/// Opens and closes input device nodes through broker leases.
///
/// Hand this to `Libinput::new_with_udev` (or equivalent); the input
/// subsystem holds it and calls back on demand.
pub struct LeasedDeviceInterface {
    leases: DeviceLeaseClient,
}

impl LeasedDeviceInterface {
    pub fn new(leases: DeviceLeaseClient) -> Self {
        Self { leases }
    }
}

impl LibinputInterface for LeasedDeviceInterface {
    fn open_restricted(&mut self, path: &Path, _flags: i32) -> std::result::Result<OwnedFd, i32> {
        // logind decides the open mode itself; flags are not forwarded
        let id = match DeviceId::from_path(path) {
            Ok(id) => id,
            Err(e) => {
                warn!("input: no device id for {}: {}", path.display(), e);
                return Err(-libc::ENODEV);
            }
        };
        match self.leases.take_device(id) {
            Ok(lease) => Ok(lease.into_fd()),
            Err(e) => {
                warn!("input: cannot lease {}: {}", path.display(), e);
                Err(-libc::EACCES)
            }
        }
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        // best effort: the lease may already be gone broker-side, but
        // the local descriptor is closed no matter what
        match DeviceId::from_fd(fd.as_fd()) {
            Ok(id) => self.leases.release_device_logged(id),
            Err(e) => warn!("input: no device id for closing fd: {}", e),
        }
        drop(fd);
    }
}
