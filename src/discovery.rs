//! Serial port discovery and sensor-device scoring.
//!
//! Enumerates the ports the platform exposes and scores each against a
//! vendor/manufacturer heuristic for "likely sensor device". The enumeration
//! backend sits behind the [`PortDiscovery`] trait so tests can inject
//! scripted candidate lists.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serialport::SerialPortType;
use thiserror::Error;
use tracing::debug;

/// Manufacturer substrings that mark a port as a likely sensor device.
/// Matched case-insensitively against the reported manufacturer string.
const LIKELY_MANUFACTURERS: &[&str] = &[
    "arduino",
    "esp32",
    "silicon labs",
    "ch340",
    "ftdi",
    "prolific",
];

/// USB vendor IDs of common hobbyist USB-to-serial bridges.
///
/// 0x10C4 Silicon Labs CP210x, 0x1A86 WCH CH340/CH341, 0x0403 FTDI,
/// 0x2341 Arduino.
const KNOWN_VENDOR_IDS: &[u16] = &[0x10C4, 0x1A86, 0x0403, 0x2341];

/// Errors that can occur during port discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The platform reported zero serial ports.
    #[error("no ports available")]
    NoPortsAvailable,

    /// The underlying platform enumeration failed.
    #[error("port enumeration failed: {0}")]
    Enumeration(String),
}

/// A discovered serial port, scored against the sensor-device heuristic.
///
/// Ephemeral: recomputed on every discovery call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCandidate {
    /// System path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    /// Manufacturer string as reported by the USB descriptor.
    pub manufacturer: Option<String>,
    /// USB vendor ID.
    pub vendor_id: Option<u16>,
    /// USB product ID.
    pub product_id: Option<u16>,
    /// Whether this candidate matched the sensor-device heuristic.
    pub is_likely_match: bool,
}

impl PortCandidate {
    /// Build a candidate from raw descriptor fields, applying the heuristic.
    pub fn new(
        path: impl Into<String>,
        manufacturer: Option<String>,
        vendor_id: Option<u16>,
        product_id: Option<u16>,
    ) -> Self {
        let is_likely_match = is_likely_sensor_device(manufacturer.as_deref(), vendor_id);
        Self {
            path: path.into(),
            manufacturer,
            vendor_id,
            product_id,
            is_likely_match,
        }
    }
}

/// Heuristic: does this manufacturer string or vendor ID look like a
/// hobbyist sensor board?
pub fn is_likely_sensor_device(manufacturer: Option<&str>, vendor_id: Option<u16>) -> bool {
    if let Some(m) = manufacturer {
        let lower = m.to_lowercase();
        if LIKELY_MANUFACTURERS.iter().any(|kw| lower.contains(kw)) {
            return true;
        }
    }
    matches!(vendor_id, Some(vid) if KNOWN_VENDOR_IDS.contains(&vid))
}

/// Pick the port to connect to: the first likely candidate in enumeration
/// order, falling back to the first candidate of any kind.
pub fn pick_best(candidates: &[PortCandidate]) -> Result<&PortCandidate, DiscoveryError> {
    candidates
        .iter()
        .find(|c| c.is_likely_match)
        .or_else(|| candidates.first())
        .ok_or(DiscoveryError::NoPortsAvailable)
}

/// Find a likely candidate worth hot-switching to, given the currently
/// connected path. Only likely matches are considered; the any-port
/// fallback of [`pick_best`] applies to initial connects, not switches.
pub fn best_switch_target<'a>(
    candidates: &'a [PortCandidate],
    current_path: &str,
) -> Option<&'a PortCandidate> {
    candidates
        .iter()
        .find(|c| c.is_likely_match)
        .filter(|c| c.path != current_path)
}

/// Enumerates candidate serial ports.
#[async_trait]
pub trait PortDiscovery: Send + Sync {
    /// List every serial port the platform currently exposes, scored.
    async fn list(&self) -> Result<Vec<PortCandidate>, DiscoveryError>;
}

/// [`PortDiscovery`] backed by `serialport::available_ports()`.
///
/// Enumeration can touch the registry/sysfs and is run on the blocking
/// thread pool so it never stalls the supervisor loop.
#[derive(Debug, Default, Clone)]
pub struct SystemPortDiscovery;

impl SystemPortDiscovery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PortDiscovery for SystemPortDiscovery {
    async fn list(&self) -> Result<Vec<PortCandidate>, DiscoveryError> {
        let ports = tokio::task::spawn_blocking(serialport::available_ports)
            .await
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?;

        let candidates: Vec<PortCandidate> = ports
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) => PortCandidate::new(
                    p.port_name,
                    usb.manufacturer,
                    Some(usb.vid),
                    Some(usb.pid),
                ),
                _ => PortCandidate::new(p.port_name, None, None, None),
            })
            .collect();

        debug!(
            total = candidates.len(),
            likely = candidates.iter().filter(|c| c.is_likely_match).count(),
            "enumerated serial ports"
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str, manufacturer: Option<&str>, vid: Option<u16>) -> PortCandidate {
        PortCandidate::new(path, manufacturer.map(String::from), vid, None)
    }

    #[test]
    fn test_manufacturer_heuristic_case_insensitive() {
        assert!(is_likely_sensor_device(Some("Arduino LLC"), None));
        assert!(is_likely_sensor_device(Some("SILICON LABS"), None));
        assert!(is_likely_sensor_device(Some("wch.cn CH340"), None));
        assert!(!is_likely_sensor_device(Some("Intel Corp"), None));
        assert!(!is_likely_sensor_device(None, None));
    }

    #[test]
    fn test_vendor_id_heuristic() {
        assert!(is_likely_sensor_device(None, Some(0x2341)));
        assert!(is_likely_sensor_device(None, Some(0x0403)));
        assert!(!is_likely_sensor_device(None, Some(0xFFFF)));
    }

    #[test]
    fn test_pick_best_prefers_likely_match() {
        let candidates = vec![
            candidate("/dev/ttyS0", None, None),
            candidate("/dev/ttyACM0", None, Some(0x2341)),
            candidate("/dev/ttyUSB0", Some("FTDI"), Some(0x0403)),
        ];
        let best = pick_best(&candidates).expect("should pick a port");
        assert_eq!(best.path, "/dev/ttyACM0", "first likely match wins");
    }

    #[test]
    fn test_pick_best_falls_back_to_first() {
        let candidates = vec![
            candidate("/dev/ttyS0", None, None),
            candidate("/dev/ttyS1", None, None),
        ];
        let best = pick_best(&candidates).expect("should pick a port");
        assert_eq!(best.path, "/dev/ttyS0");
    }

    #[test]
    fn test_pick_best_empty_list_fails() {
        let result = pick_best(&[]);
        assert!(matches!(result, Err(DiscoveryError::NoPortsAvailable)));
    }

    #[test]
    fn test_switch_target_ignores_current_port() {
        let candidates = vec![candidate("/dev/ttyACM0", Some("Arduino"), Some(0x2341))];
        assert!(best_switch_target(&candidates, "/dev/ttyACM0").is_none());
    }

    #[test]
    fn test_switch_target_ignores_unlikely_ports() {
        let candidates = vec![
            candidate("/dev/ttyS0", None, None),
            candidate("/dev/ttyS1", None, None),
        ];
        assert!(best_switch_target(&candidates, "/dev/ttyS9").is_none());
    }

    #[test]
    fn test_switch_target_finds_better_port() {
        let candidates = vec![
            candidate("/dev/ttyS0", None, None),
            candidate("/dev/ttyUSB0", Some("Silicon Labs"), Some(0x10C4)),
        ];
        let target =
            best_switch_target(&candidates, "/dev/ttyS0").expect("should find switch target");
        assert_eq!(target.path, "/dev/ttyUSB0");
    }
}
