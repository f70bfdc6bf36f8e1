//! Session control
//!
//! The orchestrator: owns the broker connections, the cached activation
//! flag, the seat identity and the renderer handoff, and reconciles the
//! cached state against broker-reported truth on every activation
//! change.
//!
//! The session can be deactivated by an external actor at any time
//! (a VT switch triggered from another session), so the cached flag is
//! never trusted on its own: reconciliation always re-reads the
//! broker's `Active` property and diffs against the cache.

use std::path::Path;

use log::{debug, info, warn};
use zbus::blocking::proxy::PropertyIterator;
use zbus::blocking::Connection;

use crate::device::{DeviceId, DeviceLease, DeviceLeaseClient};
use crate::error::{Error, Result};
use crate::input::{InputHandoff, LeasedDeviceInterface};
use crate::logind::{self, Login1SeatProxyBlocking, Login1SessionProxyBlocking};
use crate::render::{RenderBackend, RendererHandoff};

/// Knobs for session acquisition.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Passed to the broker's TakeControl: wrestle control away from a
    /// current controller instead of failing.
    pub force_takeover: bool,
}

/// Observed change of the session's activation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Activated,
    Deactivated,
}

/// The cached activation flag. Mutated only by reconciliation.
pub(crate) struct ActivationState {
    active: bool,
}

impl ActivationState {
    /// A fresh controller assumes foreground: session creation normally
    /// happens for the session being brought up as current.
    pub(crate) fn new() -> Self {
        Self { active: true }
    }

    /// Compare broker truth against the cache. `None` means no change
    /// (duplicate notifications are suppressed here).
    pub(crate) fn diff(&self, active: bool) -> Option<Transition> {
        if active == self.active {
            None
        } else if active {
            Some(Transition::Activated)
        } else {
            Some(Transition::Deactivated)
        }
    }

    /// Record the new truth. Called after the transition side effects.
    pub(crate) fn commit(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }
}

/// Input first, then the renderer: devices must be released before the
/// clock freezes, and reclaimed before the forced redraw runs.
pub(crate) fn apply_transition(
    renderer: &mut RendererHandoff,
    input: &mut dyn InputHandoff,
    transition: Transition,
) {
    match transition {
        Transition::Activated => {
            input.reclaim_devices();
            renderer.unpause();
        }
        Transition::Deactivated => {
            input.release_devices();
            renderer.pause();
        }
    }
}

/// Runs its teardown action exactly once, on drop.
///
/// Construction builds one of these per acquired resource; an early
/// return unwinds whatever was acquired so far, in reverse.
pub(crate) struct ControlGuard {
    release: Option<Box<dyn FnOnce()>>,
}

impl ControlGuard {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for ControlGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Arbitrates this process's access to the seat's hardware.
///
/// One instance per process, alive for the whole graphical session.
/// Field order matters for teardown: the renderer's device lease is
/// returned before session control is released.
pub struct SessionController {
    seat_id: String,
    state: ActivationState,
    input: Box<dyn InputHandoff>,
    leaser: DeviceLeaseClient,
    session: Login1SessionProxyBlocking<'static>,
    seat: Login1SeatProxyBlocking<'static>,
    changes: PropertyIterator<'static, bool>,
    renderer: RendererHandoff,
    _control: ControlGuard,
}

impl SessionController {
    /// Connect to the system bus and acquire the session.
    pub fn new(
        options: SessionOptions,
        backend: Box<dyn RenderBackend>,
        input: Box<dyn InputHandoff>,
    ) -> Result<Self> {
        let conn = logind::system_bus()?;
        Self::with_connection(&conn, options, backend, input)
    }

    /// Acquire the session over an existing bus connection.
    ///
    /// Order: take control, resolve the seat, connect the seat object,
    /// start the renderer, subscribe to activation changes. Any failure
    /// after control was taken issues exactly one best-effort
    /// ReleaseControl before the error surfaces.
    pub fn with_connection(
        conn: &Connection,
        options: SessionOptions,
        backend: Box<dyn RenderBackend>,
        input: Box<dyn InputHandoff>,
    ) -> Result<Self> {
        let session = logind::session_proxy(conn)?;

        if let Err(e) = session.take_control(options.force_takeover) {
            // control may have been partially granted; hand it back
            if let Err(re) = session.release_control() {
                debug!("session: release after failed take: {}", re);
            }
            return Err(e.into());
        }
        debug!("session: took control (force={})", options.force_takeover);

        let release_session = session.clone();
        let control = ControlGuard::new(move || {
            if let Err(e) = release_session.release_control() {
                warn!("session: could not release control: {}", e);
            }
        });

        let (seat_id, _seat_path) = session.seat()?;
        if seat_id.is_empty() {
            return Err(Error::NotFound("session has no seat".into()));
        }

        let seat = logind::seat_proxy(conn)?;

        let leaser = DeviceLeaseClient::new(session.clone());
        let mut renderer = RendererHandoff::new(backend);
        renderer.start(&seat_id, &leaser)?;

        let monitor = logind::session_monitor_proxy(conn, &session)?;
        let changes = monitor.receive_active_changed();

        info!("session: controlling session on {}", seat_id);
        Ok(Self {
            seat_id,
            state: ActivationState::new(),
            input,
            leaser,
            session,
            seat,
            changes,
            renderer,
            _control: control,
        })
    }

    /// The seat this session sits on.
    pub fn seat_id(&self) -> &str {
        &self.seat_id
    }

    /// The cached activation flag.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// The leased modesetting descriptor, once the renderer started.
    pub fn modesetting_fd(&self) -> Option<std::os::fd::RawFd> {
        self.renderer.modesetting_fd()
    }

    /// A lease client sharing this controller's session connection.
    pub fn lease_client(&self) -> DeviceLeaseClient {
        self.leaser.clone()
    }

    /// The open/close capability to register with the input subsystem.
    pub fn device_interface(&self) -> LeasedDeviceInterface {
        LeasedDeviceInterface::new(self.leaser.clone())
    }

    /// Lease an arbitrary device node through the broker.
    pub fn take_device(&self, path: &Path) -> Result<DeviceLease> {
        let id = DeviceId::from_path(path)?;
        self.leaser.take_device(id)
    }

    /// Reconcile the cached activation flag against broker truth,
    /// driving the input and renderer transitions on change. Duplicate
    /// notifications are no-ops.
    pub fn sync_active(&mut self) -> Result<()> {
        let active = self.session.active()?;
        let Some(transition) = self.state.diff(active) else {
            return Ok(());
        };
        debug!("session: {:?}", transition);
        apply_transition(&mut self.renderer, self.input.as_mut(), transition);
        self.state.commit(active);
        Ok(())
    }

    /// Block until the broker signals an activation change, then
    /// reconcile. The embedding event loop's suspension point.
    pub fn dispatch_activity_change(&mut self) -> Result<()> {
        match self.changes.next() {
            Some(_) => self.sync_active(),
            None => Err(Error::Broker(zbus::Error::Failure(
                "activation change stream closed".into(),
            ))),
        }
    }

    /// Ask the broker to make this the foreground session, then
    /// reconcile eagerly instead of waiting for the notification.
    pub fn activate_session(&mut self) -> Result<()> {
        self.session.activate()?;
        self.sync_active()
    }

    /// Switch the hardware VT. Independent of [`activate_session`]:
    /// cross-session transfer needs both the seat-level VT switch and
    /// the broker-level session activation.
    ///
    /// [`activate_session`]: SessionController::activate_session
    pub fn activate_vt(&self, vt: i8) -> Result<()> {
        if vt < 1 {
            return Err(Error::InvalidVt(vt));
        }
        self.seat.switch_to(vt as u32)?;
        Ok(())
    }
}
