//! Device identity and broker leases
//!
//! Converts device paths or open descriptors to kernel (major, minor)
//! pairs and performs the take/release device calls against logind.
//! A lease is a revocable grant of exclusive access to one device node;
//! its descriptor is owned by the caller until explicitly released.

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::Path;

use log::{debug, warn};
use nix::sys::stat::{fstat, major, minor, stat, SFlag};

use crate::error::{Error, Result};
use crate::logind::Login1SessionProxyBlocking;

/// Kernel device-number pair identifying one device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

impl DeviceId {
    /// Resolve a device id from a filesystem path.
    ///
    /// Fails with `NotFound` if the path resolves to something other
    /// than a character device.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let st = stat(path).map_err(|e| Error::Io(e.into()))?;
        if !is_char_mode(st.st_mode) {
            return Err(Error::NotFound(format!(
                "{} is not a character device",
                path.display()
            )));
        }
        Ok(Self::from_rdev(st.st_rdev))
    }

    /// Resolve a device id from an already-open descriptor.
    pub fn from_fd(fd: BorrowedFd<'_>) -> Result<Self> {
        let st = fstat(fd.as_raw_fd()).map_err(|e| Error::Io(e.into()))?;
        if !is_char_mode(st.st_mode) {
            return Err(Error::NotFound(format!(
                "fd {} is not a character device",
                fd.as_raw_fd()
            )));
        }
        Ok(Self::from_rdev(st.st_rdev))
    }

    fn from_rdev(rdev: libc::dev_t) -> Self {
        Self {
            major: major(rdev) as u32,
            minor: minor(rdev) as u32,
        }
    }
}

fn is_char_mode(mode: libc::mode_t) -> bool {
    SFlag::from_bits_truncate(mode) & SFlag::S_IFMT == SFlag::S_IFCHR
}

/// True if the path exists and is a character device node.
pub(crate) fn is_character_device(path: &Path) -> bool {
    matches!(stat(path), Ok(st) if is_char_mode(st.st_mode))
}

/// One leased device node.
///
/// The descriptor closes when the lease drops, but the broker-side grant
/// is only returned by an explicit [`DeviceLeaseClient::release_device`];
/// holders on teardown paths use [`DeviceLeaseClient::release_device_logged`].
#[derive(Debug)]
pub struct DeviceLease {
    id: DeviceId,
    fd: OwnedFd,
    paused: bool,
}

impl DeviceLease {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Whether the broker handed the device over already paused
    /// (revocation pending on the broker side).
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Give up ownership of the descriptor, leaving the broker-side
    /// grant to the caller's bookkeeping.
    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }
}

/// Take/release device-lease calls against the broker's session object.
///
/// Cheap to clone; clones share the underlying bus connection, so the
/// input subsystem can hold one while the controller keeps another.
#[derive(Clone)]
pub struct DeviceLeaseClient {
    session: Login1SessionProxyBlocking<'static>,
}

impl DeviceLeaseClient {
    pub(crate) fn new(session: Login1SessionProxyBlocking<'static>) -> Self {
        Self { session }
    }

    /// Lease a device from the broker. Ownership of the descriptor
    /// transfers to the returned lease.
    pub fn take_device(&self, id: DeviceId) -> Result<DeviceLease> {
        let (fd, paused) = self.session.take_device(id.major, id.minor)?;
        if paused {
            warn!(
                "device: broker handed over {},{} in paused state",
                id.major, id.minor
            );
        }
        debug!("device: leased {},{}", id.major, id.minor);
        Ok(DeviceLease {
            id,
            fd: fd.into(),
            paused,
        })
    }

    /// Return a lease to the broker.
    pub fn release_device(&self, id: DeviceId) -> Result<()> {
        self.session.release_device(id.major, id.minor)?;
        debug!("device: released {},{}", id.major, id.minor);
        Ok(())
    }

    /// Return a lease, downgrading failure to a warning. Teardown of one
    /// device must not block teardown of others or of the process.
    pub fn release_device_logged(&self, id: DeviceId) {
        if let Err(e) = self.release_device(id) {
            warn!("device: could not release {},{}: {}", id.major, id.minor, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::AsFd;

    #[test]
    fn null_device_resolves() {
        let id = DeviceId::from_path("/dev/null").expect("/dev/null should be a char device");
        // mem devices are fixed at major 1, /dev/null at minor 3
        assert_eq!(id, DeviceId { major: 1, minor: 3 });
    }

    #[test]
    fn null_device_resolves_from_fd() {
        let file = File::open("/dev/null").unwrap();
        let id = DeviceId::from_fd(file.as_fd()).unwrap();
        assert_eq!(id, DeviceId { major: 1, minor: 3 });
    }

    #[test]
    fn regular_file_is_not_found() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"not a device").unwrap();
        match DeviceId::from_path(tmp.path()) {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_path_is_io_error() {
        match DeviceId::from_path("/nonexistent/card0") {
            Err(Error::Io(_)) => {}
            other => panic!("expected Io, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn char_device_predicate() {
        assert!(is_character_device(Path::new("/dev/null")));
        assert!(!is_character_device(Path::new("/etc/hostname")));
        assert!(!is_character_device(Path::new("/nonexistent")));
    }
}
