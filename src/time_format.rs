use std::fmt;

/// Shown next to swimmers that have no captured time yet
pub const PLACEHOLDER: &str = "--:--,--";

/// Format milliseconds as "MM:SS,CC" (centiseconds, comma separated)
pub fn format_time(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let centiseconds = (ms % 1000) / 10;
    format!("{:02}:{:02},{:02}", minutes, seconds, centiseconds)
}

/// A captured point on the heat clock.
///
/// The millisecond value stays inside the crate; everything that leaves it
/// (results, the database, exports) carries the formatted string only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTime {
    millis: u64,
}

impl SplitTime {
    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }
}

impl fmt::Display for SplitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_time(self.millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_zero() {
        assert_eq!(format_time(0), "00:00,00");
    }

    #[test]
    fn test_format_time_minutes_and_centiseconds() {
        assert_eq!(format_time(61_234), "01:01,23");
        assert_eq!(format_time(599_990), "09:59,99");
    }

    #[test]
    fn test_format_time_truncates_sub_centisecond() {
        assert_eq!(format_time(9), "00:00,00");
        assert_eq!(format_time(19), "00:00,01");
        assert_eq!(format_time(999), "00:00,99");
    }

    #[test]
    fn test_format_time_long_heats() {
        assert_eq!(format_time(3_600_000), "60:00,00");
        assert_eq!(format_time(6_000_000), "100:00,00");
    }

    #[test]
    fn test_split_time_display() {
        let split = SplitTime::from_millis(32_470);
        assert_eq!(split.to_string(), "00:32,47");
        assert_eq!(split.as_millis(), 32_470);
    }

    #[test]
    fn test_split_time_ordering() {
        assert!(SplitTime::from_millis(10) < SplitTime::from_millis(20));
    }
}
