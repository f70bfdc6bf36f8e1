//! Renderer handoff
//!
//! Owns the single leased modesetting descriptor and drives the
//! rendering subsystem's pause/unpause lifecycle around VT switches.
//! The rendering pipeline itself lives behind [`RenderBackend`].

use std::os::fd::RawFd;

use log::info;

use crate::adapter;
use crate::device::{DeviceId, DeviceLease, DeviceLeaseClient};
use crate::error::{Error, Result};

/// Hook surface of the rendering subsystem.
///
/// All hooks are infallible: a failing graphics call at this layer is a
/// defect in the backend, not a recoverable condition here.
pub trait RenderBackend {
    /// Publish the leased descriptor as the active modesetting handle.
    fn set_modesetting_fd(&mut self, fd: RawFd);

    /// Stop the render clock; frames stop being scheduled.
    fn freeze_clock(&mut self);

    /// Resume the render clock.
    fn thaw_clock(&mut self);

    /// Invalidate the cached output-mode state. The hardware behind the
    /// descriptor may have been reconfigured while the session was away.
    fn reset_display_modes(&mut self);

    /// Schedule a full-surface redraw.
    fn queue_full_redraw(&mut self);

    /// Re-upload the cursor image. Cursor planes are commonly lost
    /// across a VT switch.
    fn force_cursor_update(&mut self);
}

/// Holds the modesetting lease and the pause/unpause transitions.
pub struct RendererHandoff {
    backend: Box<dyn RenderBackend>,
    leaser: Option<DeviceLeaseClient>,
    lease: Option<DeviceLease>,
}

impl RendererHandoff {
    pub fn new(backend: Box<dyn RenderBackend>) -> Self {
        Self {
            backend,
            leaser: None,
            lease: None,
        }
    }

    /// Locate the seat's primary adapter, lease it, and publish the
    /// descriptor to the rendering subsystem. Called exactly once; a
    /// second call fails rather than leaking the first lease.
    pub fn start(&mut self, seat_id: &str, leaser: &DeviceLeaseClient) -> Result<()> {
        if self.lease.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let path = adapter::find_primary_adapter(seat_id)?;
        let id = DeviceId::from_path(&path)?;
        let lease = leaser.take_device(id)?;
        info!(
            "render: modesetting device {} ({},{})",
            path.display(),
            id.major,
            id.minor
        );

        self.backend.set_modesetting_fd(lease.as_raw_fd());
        self.lease = Some(lease);
        self.leaser = Some(leaser.clone());
        Ok(())
    }

    /// Logical suspend. The descriptor stays leased.
    pub fn pause(&mut self) {
        self.backend.freeze_clock();
    }

    /// Thaw the clock and repair everything a VT switch may have
    /// clobbered: mode state first, then an immediate redraw, then the
    /// cursor plane.
    pub fn unpause(&mut self) {
        self.backend.reset_display_modes();
        self.backend.thaw_clock();
        self.backend.queue_full_redraw();
        self.backend.force_cursor_update();
    }

    /// The leased modesetting descriptor, once started.
    pub fn modesetting_fd(&self) -> Option<RawFd> {
        self.lease.as_ref().map(|l| l.as_raw_fd())
    }
}

impl Drop for RendererHandoff {
    fn drop(&mut self) {
        if let (Some(leaser), Some(lease)) = (self.leaser.take(), self.lease.take()) {
            leaser.release_device_logged(lease.id());
            // descriptor closes when the lease drops
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records hook invocations in order; shared with the test body.
    pub(crate) struct RecordingBackend {
        pub log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl RenderBackend for RecordingBackend {
        fn set_modesetting_fd(&mut self, _fd: RawFd) {
            self.log.borrow_mut().push("set_modesetting_fd");
        }
        fn freeze_clock(&mut self) {
            self.log.borrow_mut().push("freeze_clock");
        }
        fn thaw_clock(&mut self) {
            self.log.borrow_mut().push("thaw_clock");
        }
        fn reset_display_modes(&mut self) {
            self.log.borrow_mut().push("reset_display_modes");
        }
        fn queue_full_redraw(&mut self) {
            self.log.borrow_mut().push("queue_full_redraw");
        }
        fn force_cursor_update(&mut self) {
            self.log.borrow_mut().push("force_cursor_update");
        }
    }

    #[test]
    fn pause_only_freezes_the_clock() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut handoff = RendererHandoff::new(Box::new(RecordingBackend { log: log.clone() }));
        handoff.pause();
        assert_eq!(*log.borrow(), vec!["freeze_clock"]);
    }

    #[test]
    fn unpause_repairs_modes_before_thawing_and_cursor_last() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut handoff = RendererHandoff::new(Box::new(RecordingBackend { log: log.clone() }));
        handoff.unpause();
        assert_eq!(
            *log.borrow(),
            vec![
                "reset_display_modes",
                "thaw_clock",
                "queue_full_redraw",
                "force_cursor_update"
            ]
        );
    }

    #[test]
    fn unstarted_handoff_has_no_descriptor() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let handoff = RendererHandoff::new(Box::new(RecordingBackend { log }));
        assert!(handoff.modesetting_fd().is_none());
    }
}
