//! Human-readable rendering of byte counts, rates and durations.

use std::time::Duration;

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Placeholder shown when no ETA can be computed.
pub const UNKNOWN_ETA: &str = "--:--:--";

/// Formats a byte quantity with binary units and two decimals, e.g. `1.50 KB`.
#[must_use]
pub fn format_bytes(bytes: f64) -> String {
    let mut value = if bytes.is_finite() { bytes.max(0.0) } else { 0.0 };
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

/// Formats a `u64` byte count; see [`format_bytes`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_byte_count(bytes: u64) -> String {
    format_bytes(bytes as f64)
}

/// Formats a transfer rate in bytes per second, e.g. `2.00 MB/s`.
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// Formats a duration as `HH:MM:SS`. Hours are not wrapped at 24.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Formats an optional ETA, using [`UNKNOWN_ETA`] when undefined.
#[must_use]
pub fn format_eta(eta: Option<Duration>) -> String {
    eta.map_or_else(|| UNKNOWN_ETA.to_string(), format_duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0.0), "0.00 B");
        assert_eq!(format_bytes(1023.0), "1023.00 B");
        assert_eq!(format_bytes(1536.0), "1.50 KB");
        assert_eq!(format_byte_count(10 * 1024 * 1024), "10.00 MB");
        assert_eq!(format_byte_count(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_byte_count(2 * 1024 * 1024 * 1024 * 1024), "2.00 TB");
    }

    #[test]
    fn test_format_bytes_rejects_nonsense() {
        assert_eq!(format_bytes(-5.0), "0.00 B");
        assert_eq!(format_bytes(f64::NAN), "0.00 B");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(2048.0), "2.00 KB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_duration(Duration::from_secs(3661)), "01:01:01");
        assert_eq!(format_duration(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(None), "--:--:--");
        assert_eq!(format_eta(Some(Duration::from_secs(59))), "00:00:59");
    }
}
