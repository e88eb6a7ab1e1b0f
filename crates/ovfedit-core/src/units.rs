//! Memory quantity parsing and RASD allocation unit decoding.

use tracing::warn;

use crate::error::{Error, Result};

/// `AllocationUnits` value written for memory items.
pub const MIB_ALLOCATION_UNITS: &str = "byte * 2^20";

/// Parse a memory quantity into MiB.
///
/// Accepts `M`, `MB`, `MiB`, `G`, `GB` and `GiB` suffixes in any case. A bare
/// number is accepted as MiB with a logged notice.
pub fn parse_memory_mib(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    if digits.is_empty() {
        return Err(Error::invalid_input(format!(
            "could not parse memory value '{input}'"
        )));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::invalid_input(format!("memory value '{input}' is out of range")))?;

    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" => {
            warn!("memory units not specified, guessing '{value}' means {value} MiB");
            1
        }
        "m" | "mb" | "mib" => 1,
        "g" | "gb" | "gib" => 1024,
        other => {
            return Err(Error::invalid_input(format!(
                "unrecognized memory unit '{other}' in '{input}'"
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::invalid_input(format!("memory value '{input}' is out of range")))
}

/// Number of bytes represented by one unit of a RASD `AllocationUnits` string.
///
/// Handles the programmatic form (`byte * 2^20`, `byte * 1024`) as well as
/// the legacy names some producers still write (`MegaBytes`, `GigaBytes`).
pub fn allocation_unit_bytes(units: &str) -> Option<u64> {
    let normalized: String = units
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "byte" | "bytes" => return Some(1),
        "kilobytes" | "kb" => return Some(1 << 10),
        "megabytes" | "mb" => return Some(1 << 20),
        "gigabytes" | "gb" => return Some(1 << 30),
        _ => {}
    }

    let mut factor: u64 = 1;
    let mut terms = normalized.split('*');
    if terms.next()? != "byte" {
        return None;
    }
    for term in terms {
        let value = match term.split_once('^') {
            Some((base, exp)) => {
                let base: u64 = base.parse().ok()?;
                let exp: u32 = exp.parse().ok()?;
                base.checked_pow(exp)?
            }
            None => term.parse().ok()?,
        };
        factor = factor.checked_mul(value)?;
    }
    Some(factor)
}

/// Convert a quantity in the given allocation units to MiB, rounding down.
pub fn quantity_to_mib(quantity: u64, units: &str) -> Option<u64> {
    let bytes = quantity.checked_mul(allocation_unit_bytes(units)?)?;
    Some(bytes >> 20)
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TiB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
