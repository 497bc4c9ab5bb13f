//! Number and text formatting shared by every renderer.
//!
//! Values use the shortest decimal that round-trips to the same `f64`:
//! integral values print without a fractional part (`1000`), others print
//! only the digits they need (`676.5`). Every table goes through these
//! helpers so rendered output stays stable.
//!
//! Deltas are rounded to the finer decimal precision of their two operands
//! before they are printed or serialized: `80.1 -> 80.3` is `+0.2` and
//! `1000 -> 9393` is `+8393`. Operands with more than 15 decimal places
//! leave the delta unrounded.

/// Placeholder for a value that does not exist on one side of a diff.
pub const ABSENT: &str = "—";

/// Format a measurement value.
///
/// # Example
///
/// ```
/// use covtrack::report::format::format_value;
///
/// assert_eq!(format_value(1000.0), "1000");
/// assert_eq!(format_value(676.5), "676.5");
/// assert_eq!(format_value(-0.0), "0");
/// ```
#[must_use]
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        // Covers -0.0 as well.
        return "0".to_string();
    }
    format!("{}", value)
}

/// Largest number of decimal places a delta is rounded to.
const MAX_DELTA_PLACES: usize = 15;

/// `after - before`, rounded to the finer decimal precision of the operands.
///
/// # Example
///
/// ```
/// use covtrack::report::format::rounded_delta;
///
/// assert_eq!(rounded_delta(0.1, 0.3), 0.2);
/// assert_eq!(rounded_delta(676.5, 456.0), -220.5);
/// ```
#[must_use]
pub fn rounded_delta(before: f64, after: f64) -> f64 {
    let delta = after - before;
    let places = decimal_places(before).max(decimal_places(after));
    if !delta.is_finite() || places > MAX_DELTA_PLACES {
        return delta;
    }
    let scale = 10f64.powi(places as i32);
    (delta * scale).round() / scale
}

/// Digits after the decimal point in the shortest representation.
fn decimal_places(value: f64) -> usize {
    format!("{}", value)
        .split_once('.')
        .map_or(0, |(_, fraction)| fraction.len())
}

/// Format a delta with an explicit sign; zero has no sign.
///
/// # Example
///
/// ```
/// use covtrack::report::format::format_delta;
///
/// assert_eq!(format_delta(8393.0), "+8393");
/// assert_eq!(format_delta(-220.5), "-220.5");
/// assert_eq!(format_delta(0.0), "0");
/// ```
#[must_use]
pub fn format_delta(delta: f64) -> String {
    if delta == 0.0 {
        return "0".to_string();
    }
    format!("{:+}", delta)
}

/// Format a value followed by its unit suffix.
#[must_use]
pub fn with_unit(value: String, unit: &str) -> String {
    if unit.is_empty() {
        value
    } else {
        format!("{}{}", value, unit)
    }
}

/// Abbreviate a commit SHA to seven characters.
#[must_use]
pub fn short_commit(commit: &str) -> &str {
    match commit.char_indices().nth(7) {
        Some((idx, _)) => &commit[..idx],
        None => commit,
    }
}

/// Escape characters that would break a markdown table cell.
#[must_use]
pub fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
