use crate::error::AppError;
use std::time::Duration;
use tracing::debug;

/// Parses a human-readable duration such as `2m50s`, `90s`, `1h` or `1.5m`.
///
/// The input is a sequence of `<number><unit>` pairs. Supported units are
/// `h`, `m`, `s`, `ms`, `us` (or `µs`) and `ns`; numbers may carry a
/// fractional part. A bare `0` is accepted and means "no duration".
///
/// # Errors
///
/// Returns `AppError::InvalidInput` when the input is empty, a number is
/// missing its unit, a unit is unknown, or the total overflows.
pub fn parse_duration(input: &str) -> Result<Duration, AppError> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("empty duration".to_string()));
    }

    let invalid =
        |reason: &str| AppError::InvalidInput(format!("invalid duration `{input}`: {reason}"));

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse().map_err(|_| invalid("malformed number"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let nanos_per_unit = match unit {
            "h" => 3_600_000_000_000.0,
            "m" => 60_000_000_000.0,
            "s" => 1_000_000_000.0,
            "ms" => 1_000_000.0,
            "us" | "µs" => 1_000.0,
            "ns" => 1.0,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };

        let nanos = (value * nanos_per_unit).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(invalid("out of range"));
        }
        let part = Duration::from_nanos(nanos as u64);
        total = total.checked_add(part).ok_or_else(|| invalid("out of range"))?;
        rest = tail;
    }

    debug!("Parsed duration `{input}` as {total:?}");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("2m50s").unwrap(), Duration::from_secs(170));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1h2m3s").unwrap(), Duration::from_secs(3723));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn parses_fractions_and_small_units() {
        assert_eq!(parse_duration("1.5m").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
    }

    #[test]
    fn zero_means_unset() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "90", "5x", "m", "1..5s", "-3s"] {
            assert!(
                matches!(parse_duration(input), Err(AppError::InvalidInput(_))),
                "{input} should be rejected"
            );
        }
    }
}
