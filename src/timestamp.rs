use std::time::{Duration, SystemTime, UNIX_EPOCH};

use humantime::{format_rfc3339_millis, parse_rfc3339_weak};

use crate::error::DispatchError;

const DATE_LEN: usize = "YYYY-MM-DD".len();
const DATE_TIME_LEN: usize = "YYYY-MM-DDTHH:MM:SS".len();
/// 9999-12-31T23:59:59Z, the last second an RFC 3339 year can express.
const MAX_EPOCH_SECS: u64 = 253_402_300_799;

/// Normalizes a caller-supplied timestamp to `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Absent or blank input yields `Ok(None)` so the field is simply omitted.
/// Accepts RFC 3339 with either `T` or a space as separator, optional
/// fractional seconds, `Z`, no zone (read as UTC) or a numeric offset, and a
/// bare date meaning midnight UTC. Anything else is an `InvalidTimestamp`.
pub fn normalize(raw: Option<&str>) -> Result<Option<String>, DispatchError> {
    let Some(text) = raw.map(str::trim).filter(|text| !text.is_empty()) else {
        return Ok(None);
    };
    let instant = parse_instant(text).ok_or_else(|| DispatchError::InvalidTimestamp {
        raw: text.to_string(),
    })?;
    Ok(Some(format_rfc3339_millis(instant).to_string()))
}

fn parse_instant(text: &str) -> Option<SystemTime> {
    if text.len() == DATE_LEN {
        return parse_rfc3339_weak(&format!("{text}T00:00:00Z")).ok();
    }
    let (local, offset_secs) = split_offset(text)?;
    let instant = parse_rfc3339_weak(local).ok()?;
    let shift = Duration::from_secs(offset_secs.unsigned_abs());
    let shifted = if offset_secs >= 0 {
        instant.checked_sub(shift)?
    } else {
        instant.checked_add(shift)?
    };
    in_printable_range(shifted).then_some(shifted)
}

/// Offsets can push an instant outside 1970..=9999, which cannot be rendered.
fn in_printable_range(instant: SystemTime) -> bool {
    instant
        .duration_since(UNIX_EPOCH)
        .is_ok_and(|since| since.as_secs() <= MAX_EPOCH_SECS)
}

/// Splits a trailing `+HH:MM`, `-HHMM` or `+HH` zone off the date-time part.
fn split_offset(text: &str) -> Option<(&str, i64)> {
    let tail = text.get(DATE_TIME_LEN..)?;
    match tail.find(['+', '-']) {
        None => Some((text, 0)),
        Some(position) => {
            let (local, zone) = text.split_at(DATE_TIME_LEN + position);
            if local.ends_with(['Z', 'z']) {
                return None;
            }
            Some((local, parse_offset(zone)?))
        }
    }
}

fn parse_offset(zone: &str) -> Option<i64> {
    let sign = match zone.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i64>().ok()?, 0),
        4 => (
            digits[..2].parse::<i64>().ok()?,
            digits[2..].parse::<i64>().ok()?,
        ),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}
