//! Text rendering shared by the data channels.
//!
//! The external consumer parses distances with a fixed-width scientific
//! notation reader, so the format is reproduced exactly: optional sign,
//! one leading digit, six fractional digits, `e`, exponent sign and a
//! three digit exponent (`1.234500e+002`).

use std::fmt::Write as _;

/// One distance value for a pair at a given simulation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    pub timestamp_us: u64,
    pub distance: f64,
}

impl DistanceSample {
    /// Render the sample as one newline-terminated data channel line.
    pub fn to_line(&self) -> String {
        format!("{} {}\n", self.timestamp_us, format_distance(self.distance))
    }
}

/// Format a distance in the consumer's fixed-width scientific notation.
///
/// Non-finite values are passed through unchanged since the consumer has
/// no representation for them anyway.
pub fn format_distance(distance: f64) -> String {
    let raw = format!("{:.6e}", distance);
    let Some((mantissa, exponent)) = raw.split_once('e') else {
        return raw;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return raw;
    };

    let mut out = String::with_capacity(mantissa.len() + 5);
    out.push_str(mantissa);
    let sign = if exponent < 0 { '-' } else { '+' };
    let _ = write!(out, "e{}{:03}", sign, exponent.abs());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_three_digit_exponent() {
        assert_eq!(format_distance(123.45), "1.234500e+002");
        assert_eq!(format_distance(1.0), "1.000000e+000");
        assert_eq!(format_distance(0.0), "0.000000e+000");
        assert_eq!(format_distance(0.00125), "1.250000e-003");
        assert_eq!(format_distance(5.0), "5.000000e+000");
        assert_eq!(format_distance(1414.2135623730951), "1.414214e+003");
    }

    #[test]
    fn keeps_sign_of_negative_values() {
        assert_eq!(format_distance(-2.5), "-2.500000e+000");
    }

    #[test]
    fn sample_line_layout() {
        let sample = DistanceSample {
            timestamp_us: 3_000_000,
            distance: 10.0,
        };
        assert_eq!(sample.to_line(), "3000000 1.000000e+001\n");
    }
}
