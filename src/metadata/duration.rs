//! `xs:duration` values as used in `cacheDuration`.

use std::time::Duration;

use super::{MetadataError, MetadataResult};

const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_HOUR: f64 = 3_600.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
// Calendar units have no fixed length; these match what metadata publishers assume.
const SECONDS_PER_MONTH: f64 = 30.0 * SECONDS_PER_DAY;
const SECONDS_PER_YEAR: f64 = 365.0 * SECONDS_PER_DAY;

const DATE_UNITS: [(char, f64); 3] = [
    ('Y', SECONDS_PER_YEAR),
    ('M', SECONDS_PER_MONTH),
    ('D', SECONDS_PER_DAY),
];
const TIME_UNITS: [(char, f64); 3] = [
    ('H', SECONDS_PER_HOUR),
    ('M', SECONDS_PER_MINUTE),
    ('S', 1.0),
];

/// Parse `PnYnMnDTnHnMnS`. Negative durations are rejected.
pub fn parse_xs_duration(value: &str) -> MetadataResult<Duration> {
    let invalid = || MetadataError::InvalidDuration(value.to_string());

    let rest = value.trim().strip_prefix('P').ok_or_else(invalid)?;
    let (date, time) = match rest.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    if date.is_empty() && time.is_none() {
        return Err(invalid());
    }

    let mut seconds = components(date, &DATE_UNITS).ok_or_else(invalid)?;
    if let Some(time) = time {
        seconds += components(time, &TIME_UNITS).ok_or_else(invalid)?;
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

/// Sum `<number><designator>` pairs; designators must appear in `units` order, once each.
fn components(mut text: &str, units: &[(char, f64)]) -> Option<f64> {
    let mut total = 0.0;
    let mut next_unit = 0;

    while !text.is_empty() {
        let end = text.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
        let (number, rest) = text.split_at(end);
        let designator = rest.chars().next()?;

        let offset = units[next_unit..]
            .iter()
            .position(|(unit, _)| *unit == designator)?;
        let (_, factor) = units[next_unit + offset];
        // Only seconds may carry a fraction
        if number.is_empty() || (number.contains('.') && designator != 'S') {
            return None;
        }
        total += number.parse::<f64>().ok()? * factor;

        next_unit += offset + 1;
        text = &rest[designator.len_utf8()..];
    }
    Some(total)
}
