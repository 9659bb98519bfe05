//! Plaintext line protocol parsing.
//!
//! `<key> <value> <timestamp>\n` — exactly three whitespace-separated
//! fields. Grounded on the original `ParseLineMetric`: split on spaces
//! rather than generic whitespace so a key or value containing a tab is
//! rejected as an extra field, not silently trimmed.

use crate::error::ParseError;
use crate::metric::Metric;

/// Parse one line of the wire protocol into a [`Metric`].
///
/// Returns [`ParseError::WrongFieldCount`] unless the line has exactly
/// three space-separated fields, and the corresponding `Invalid*` variant
/// if the value or timestamp field does not parse.
pub fn parse_line(line: &str) -> Result<Metric, ParseError> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() != 3 {
        return Err(ParseError::WrongFieldCount { found: parts.len() });
    }

    let key = parts[0];
    let value: f64 = parts[1]
        .parse()
        .map_err(|_| ParseError::InvalidValue { value: parts[1].to_string() })?;
    let timestamp: i64 = parts[2]
        .parse()
        .map_err(|_| ParseError::InvalidTimestamp { value: parts[2].to_string() })?;

    Ok(Metric::new(key, value, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_valid_line() {
        let metric = parse_line("foo 42 74857843").unwrap();
        assert_eq!(metric.key, "foo");
        assert_eq!(metric.point.value, 42.0);
        assert_eq!(metric.point.timestamp, 74857843);
    }

    #[test]
    fn rejects_too_few_fields() {
        let err = parse_line("foo 42").unwrap_err();
        assert_eq!(err, ParseError::WrongFieldCount { found: 2 });
    }

    #[test]
    fn rejects_bad_value() {
        let err = parse_line("foo 4x 10").unwrap_err();
        assert_eq!(err, ParseError::InvalidValue { value: "4x".to_string() });
    }

    #[test]
    fn rejects_bad_timestamp() {
        let err = parse_line("foo 4.0 10x").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidTimestamp { value: "10x".to_string() }
        );
    }

    #[test]
    fn rejects_extra_fields() {
        let err = parse_line("foo 4.0 10 extra").unwrap_err();
        assert_eq!(err, ParseError::WrongFieldCount { found: 4 });
    }

    #[test]
    fn round_trips_through_display() {
        let metric = parse_line("machine.cpu.user 12.5 1700000000").unwrap();
        assert_eq!(metric.to_string(), format!("{metric}"));
    }
}
