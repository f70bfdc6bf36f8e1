//! logind D-Bus surface
//!
//! Proxy declarations for the org.freedesktop.login1 objects this crate
//! talks to, plus the connection plumbing that resolves the per-session
//! and per-seat objects for the calling process.
//!
//! All calls go through the blocking proxy variants: the arbitration
//! core is single-threaded and every broker RPC is a synchronous
//! suspension point.

use log::debug;

use zbus::blocking::Connection;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{OwnedFd, OwnedObjectPath};

use crate::error::{Error, Result};

#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
pub trait Login1Manager {
    #[zbus(name = "GetSessionByPID")]
    fn get_session_by_pid(&self, pid: u32) -> zbus::Result<OwnedObjectPath>;
}

#[zbus::proxy(
    interface = "org.freedesktop.login1.Session",
    default_service = "org.freedesktop.login1"
)]
pub trait Login1Session {
    fn take_control(&self, force: bool) -> zbus::Result<()>;

    fn release_control(&self) -> zbus::Result<()>;

    /// Lease a device node. The reply carries the descriptor and whether
    /// the broker handed it over in an already-paused state.
    fn take_device(&self, major: u32, minor: u32) -> zbus::Result<(OwnedFd, bool)>;

    fn release_device(&self, major: u32, minor: u32) -> zbus::Result<()>;

    fn activate(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn active(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn seat(&self) -> zbus::Result<(String, OwnedObjectPath)>;
}

#[zbus::proxy(
    interface = "org.freedesktop.login1.Seat",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1/seat/self"
)]
pub trait Login1Seat {
    fn switch_to(&self, vtnr: u32) -> zbus::Result<()>;
}

/// Connect to the system bus.
pub fn system_bus() -> Result<Connection> {
    Connection::system().map_err(Error::Broker)
}

/// Resolve the session object for the calling process.
///
/// Property caching is disabled so that every `Active`/`Seat` read is an
/// authoritative round trip to the broker, not a possibly stale cache
/// hit. The change notification uses a separate proxy (see
/// [`session_monitor_proxy`]).
pub fn session_proxy(conn: &Connection) -> Result<Login1SessionProxyBlocking<'static>> {
    let manager = Login1ManagerProxyBlocking::new(conn)?;
    let pid = std::process::id();
    let path = manager
        .get_session_by_pid(pid)
        .map_err(|e| Error::NotFound(format!("no session for pid {}: {}", pid, e)))?;
    debug!("logind: session object {}", path.as_str());

    let proxy = Login1SessionProxyBlocking::builder(conn)
        .path(path)?
        .cache_properties(CacheProperties::No)
        .build()?;
    Ok(proxy)
}

/// A second proxy for the same session object, with property caching
/// left on: zbus only delivers property-change notifications through a
/// caching proxy. Used exclusively for `receive_active_changed`.
pub fn session_monitor_proxy(
    conn: &Connection,
    session: &Login1SessionProxyBlocking<'_>,
) -> Result<Login1SessionProxyBlocking<'static>> {
    let path = OwnedObjectPath::from(session.inner().path().clone());
    let proxy = Login1SessionProxyBlocking::builder(conn)
        .path(path)?
        .build()?;
    Ok(proxy)
}

/// The seat object for the calling process. logind resolves
/// `seat/self` to whatever seat the caller's session sits on.
pub fn seat_proxy(conn: &Connection) -> Result<Login1SeatProxyBlocking<'static>> {
    Login1SeatProxyBlocking::new(conn).map_err(Error::Broker)
}
