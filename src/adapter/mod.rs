//! Primary adapter discovery
//!
//! Walks the DRM subsystem through udev and picks the one card node
//! that should drive the seat's display output. Selection is split into
//! the udev-backed candidate collection and a pure ordered-rule pass so
//! the policy is testable without hardware.

use std::path::PathBuf;

use log::{debug, info};

use crate::device::is_character_device;
use crate::error::{Error, Result};

/// Devices with no explicit seat assignment belong here.
const DEFAULT_SEAT: &str = "seat0";

/// One enumerated DRM card node, reduced to the facts selection needs.
#[derive(Debug, Clone)]
pub struct AdapterCandidate {
    /// Device-file path (e.g. /dev/dri/card0).
    pub devnode: PathBuf,
    /// False for non-device entries such as connectors.
    pub is_char: bool,
    /// The ID_SEAT property, if assigned.
    pub seat: Option<String>,
    /// Whether a platform-bus ancestor exists in sysfs.
    pub on_platform_bus: bool,
    /// The PCI ancestor's boot_vga attribute, if there is one.
    pub boot_vga: Option<i64>,
}

/// Pick the primary adapter for a seat from a candidate list.
///
/// Ordered rules, first match winning within each tier:
/// - a card explicitly tagged for a non-default seat is selected
///   immediately when that tag names the queried seat, and skipped for
///   every other seat;
/// - cards on another seat are skipped;
/// - a platform-bus card outranks any PCI card;
/// - a PCI card is eligible only when its ancestor is the firmware's
///   boot VGA adapter.
pub fn select_adapter<I>(seat_id: &str, candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = AdapterCandidate>,
{
    let mut platform: Option<PathBuf> = None;
    let mut boot_vga: Option<PathBuf> = None;

    for candidate in candidates {
        // filter out entries that are not character devices, like card0-VGA-1
        if !candidate.is_char {
            continue;
        }

        // an unset ID_SEAT means seat0
        let device_seat = candidate.seat.as_deref().unwrap_or(DEFAULT_SEAT);

        if device_seat != DEFAULT_SEAT {
            // explicitly assigned somewhere other than the default seat:
            // the assignment outranks bus probing, but only for its seat
            if device_seat == seat_id {
                return Some(candidate.devnode);
            }
            continue;
        }

        // skip devices that do not belong to our seat
        if device_seat != seat_id {
            continue;
        }

        if candidate.on_platform_bus {
            platform.get_or_insert(candidate.devnode);
        } else if candidate.boot_vga == Some(1) {
            boot_vga.get_or_insert(candidate.devnode);
        }
    }

    platform.or(boot_vga)
}

/// Enumerate DRM card nodes tagged for seat assignment.
fn enumerate_candidates() -> Result<Vec<AdapterCandidate>> {
    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem("drm")?;
    enumerator.match_sysname("card*")?;
    enumerator.match_tag("seat")?;

    let mut candidates = Vec::new();
    for device in enumerator.scan_devices()? {
        let Some(devnode) = device.devnode() else {
            continue;
        };

        let seat = device
            .property_value("ID_SEAT")
            .and_then(|v| v.to_str())
            .map(str::to_owned);

        let on_platform_bus = device.parent_with_subsystem("platform")?.is_some();

        let boot_vga = device
            .parent_with_subsystem("pci")?
            .and_then(|pci| pci.attribute_value("boot_vga").map(|v| v.to_os_string()))
            .and_then(|v| v.to_str().and_then(|s| s.trim().parse().ok()));

        candidates.push(AdapterCandidate {
            is_char: is_character_device(devnode),
            devnode: devnode.to_path_buf(),
            seat,
            on_platform_bus,
            boot_vga,
        });
    }

    debug!("adapter: {} card candidates", candidates.len());
    Ok(candidates)
}

/// Find the device path of the primary display adapter for a seat.
pub fn find_primary_adapter(seat_id: &str) -> Result<PathBuf> {
    let path = select_adapter(seat_id, enumerate_candidates()?)
        .ok_or_else(|| Error::NotFound(format!("no DRM KMS device for seat {}", seat_id)))?;
    info!("adapter: primary adapter for {} is {}", seat_id, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(name: &str) -> PathBuf {
        PathBuf::from(format!("/dev/dri/{}", name))
    }

    fn pci_card(name: &str, boot_vga: i64) -> AdapterCandidate {
        AdapterCandidate {
            devnode: card(name),
            is_char: true,
            seat: None,
            on_platform_bus: false,
            boot_vga: Some(boot_vga),
        }
    }

    #[test]
    fn boot_vga_wins_regardless_of_enumeration_order() {
        let forward = vec![pci_card("card0", 0), pci_card("card1", 1)];
        let reverse = vec![pci_card("card1", 1), pci_card("card0", 0)];
        assert_eq!(select_adapter("seat0", forward), Some(card("card1")));
        assert_eq!(select_adapter("seat0", reverse), Some(card("card1")));
    }

    #[test]
    fn platform_outranks_boot_vga_pci() {
        let platform = AdapterCandidate {
            devnode: card("card1"),
            is_char: true,
            seat: None,
            on_platform_bus: true,
            boot_vga: None,
        };
        let candidates = vec![pci_card("card0", 1), platform];
        assert_eq!(select_adapter("seat0", candidates), Some(card("card1")));
    }

    #[test]
    fn foreign_seat_tag_is_never_selected() {
        let mut tagged = pci_card("card0", 1);
        tagged.seat = Some("seat1".into());
        assert_eq!(select_adapter("seat0", vec![tagged]), None);
    }

    #[test]
    fn matching_seat_tag_short_circuits_ahead_of_boot_vga() {
        let mut tagged = pci_card("card2", 0);
        tagged.seat = Some("seat1".into());
        // the boot-VGA card belongs to seat0 and must not leak to seat1
        let candidates = vec![pci_card("card0", 1), tagged];
        assert_eq!(select_adapter("seat1", candidates), Some(card("card2")));
    }

    #[test]
    fn explicit_default_seat_tag_behaves_like_untagged() {
        let mut tagged = pci_card("card0", 1);
        tagged.seat = Some("seat0".into());
        assert_eq!(select_adapter("seat0", vec![tagged]), Some(card("card0")));
    }

    #[test]
    fn non_char_entries_are_skipped() {
        let mut connector = pci_card("card0-VGA-1", 1);
        connector.is_char = false;
        assert_eq!(select_adapter("seat0", vec![connector]), None);
    }

    #[test]
    fn pci_without_boot_vga_never_matches() {
        assert_eq!(select_adapter("seat0", vec![pci_card("card0", 0)]), None);
        let unattributed = AdapterCandidate {
            devnode: card("card0"),
            is_char: true,
            seat: None,
            on_platform_bus: false,
            boot_vga: None,
        };
        assert_eq!(select_adapter("seat0", vec![unattributed]), None);
    }

    #[test]
    fn seat0_cards_are_invisible_to_other_seats() {
        assert_eq!(select_adapter("seat1", vec![pci_card("card0", 1)]), None);
    }
}
