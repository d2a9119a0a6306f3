//! Time-series points in InfluxDB line protocol.
//!
//! Each decoded reading becomes one point: the measurement name is the
//! series, the location is a tag and the reading is the `value` field.
//! Timestamps are left to the store (write time).

use std::fmt::Write as _;

/// Field key carrying the reading value.
pub const VALUE_FIELD: &str = "value";

/// Tag key carrying the origin location.
pub const LOCATION_TAG: &str = "location";

/// A single time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement (series) name.
    pub measurement: String,
    /// Tag set, in insertion order.
    pub tags: Vec<(String, String)>,
    /// Field value.
    pub value: f64,
}

impl Point {
    /// Create a point with no tags.
    #[must_use]
    pub fn new(measurement: impl Into<String>, value: f64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            value,
        }
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Create a point for a reading at a location.
    #[must_use]
    pub fn reading(measurement: impl Into<String>, location: impl Into<String>, value: f64) -> Self {
        Self::new(measurement, value).with_tag(LOCATION_TAG, location)
    }

    /// Render the point as one line of line protocol (no trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(64);
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            // Empty tag values are not representable
            if value.is_empty() {
                continue;
            }
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        line.push(' ');
        escape_into(&mut line, VALUE_FIELD, &[',', '=', ' ']);
        let _ = write!(line, "={}", self.value);
        line
    }
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_line() {
        let point = Point::reading("temperature", "kitchen", 22.5);
        assert_eq!(point.to_line(), "temperature,location=kitchen value=22.5");
    }

    #[test]
    fn test_whole_number_stays_float() {
        // Integers need an `i` suffix in line protocol, so a bare number is a float
        let point = Point::reading("humidity", "kitchen", 40.0);
        assert_eq!(point.to_line(), "humidity,location=kitchen value=40");
    }

    #[test]
    fn test_escaping() {
        let point = Point::reading("air temp,c", "living room=1", -3.0);
        assert_eq!(
            point.to_line(),
            r"air\ temp\,c,location=living\ room\=1 value=-3"
        );
    }

    #[test]
    fn test_empty_tag_skipped() {
        let point = Point::reading("battery", "", 3.7);
        assert_eq!(point.to_line(), "battery value=3.7");
    }
}
