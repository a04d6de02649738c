//! Text editing helpers shared by the protocol, configuration and operator
//! messages: duration and size parsing, volume name validation and the
//! space escaping applied to names carried in protocol lines.

use thiserror::Error;

/// Longest resource or volume name accepted anywhere in the protocol,
/// including the terminating position reserved by peers.
pub const MAX_NAME_LENGTH: usize = 128;

/// Stand-in for a space inside a name while it travels in a protocol line.
const ESCAPED_SPACE: char = '\x01';

const NAME_EXTRA_CHARS: &str = ":.-_ ";

// "n" sorts before "months" and "minutes" so a bare "m" means months.
const DURATION_UNITS: &[(&str, u64)] = &[
    ("n", 60),
    ("seconds", 1),
    ("months", 60 * 60 * 24 * 30),
    ("minutes", 60),
    ("hours", 60 * 60),
    ("days", 60 * 60 * 24),
    ("weeks", 60 * 60 * 24 * 7),
    ("quarters", 60 * 60 * 24 * 91),
    ("years", 60 * 60 * 24 * 365),
];

const DURATION_EDIT_UNITS: &[(&str, u64)] = &[
    ("year", 60 * 60 * 24 * 365),
    ("month", 60 * 60 * 24 * 30),
    ("day", 60 * 60 * 24),
    ("hour", 60 * 60),
    ("min", 60),
];

const SIZE_UNITS: &[(char, u64)] = &[
    ('k', 1 << 10),
    ('m', 1 << 20),
    ('g', 1 << 30),
    ('t', 1 << 40),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("`{input}` is not a valid duration")]
    InvalidDuration { input: String },
    #[error("`{input}` is not a valid size")]
    InvalidSize { input: String },
    #[error("illegal character {ch:?} in name")]
    IllegalNameCharacter { ch: char },
    #[error("name too long ({len} >= {max})")]
    NameTooLong { len: usize, max: usize },
    #[error("name must be at least one character long")]
    EmptyName,
}

/// Parses a duration such as `90`, `3 hours`, `3.5 day` or `2w` into seconds.
///
/// A bare number is taken as seconds. Modifiers match by prefix, case
/// insensitive, against the first unit that starts with them.
pub fn duration_to_seconds(input: &str) -> Result<u64, EditError> {
    let invalid = || EditError::InvalidDuration {
        input: input.to_string(),
    };
    let trimmed = input.trim();
    let split = trimmed
        .rfind(|ch: char| !ch.is_ascii_alphabetic())
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let (number, modifier) = trimmed.split_at(split);
    let number = number.trim_end();
    if !is_a_number(number) {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;
    if value < 0.0 {
        return Err(invalid());
    }
    let multiplier = if modifier.is_empty() {
        1
    } else {
        let modifier = modifier.to_ascii_lowercase();
        DURATION_UNITS
            .iter()
            .find(|(unit, _)| unit.starts_with(modifier.as_str()))
            .map(|(_, mult)| *mult)
            .ok_or_else(invalid)?
    };
    Ok((value * multiplier as f64) as u64)
}

/// Renders seconds the way operators read them, e.g. `1 day 2 hours 5 secs`.
pub fn format_duration(mut seconds: u64) -> String {
    let mut parts = Vec::new();
    for (unit, mult) in DURATION_EDIT_UNITS {
        let times = seconds / mult;
        if times > 0 {
            seconds -= times * mult;
            parts.push(format!("{} {}{}", times, unit, plural(times)));
        }
    }
    if seconds > 0 {
        parts.push(format!("{} sec{}", seconds, plural(seconds)));
    }
    if parts.is_empty() {
        return "0 secs".to_string();
    }
    parts.join(" ")
}

fn plural(count: u64) -> &'static str {
    if count > 1 {
        "s"
    } else {
        ""
    }
}

/// Parses a byte count with an optional binary suffix (`k`, `m`, `g`, `t`).
pub fn size_to_bytes(input: &str) -> Result<u64, EditError> {
    let invalid = || EditError::InvalidSize {
        input: input.to_string(),
    };
    let trimmed = input.trim();
    let last = trimmed.chars().last().ok_or_else(invalid)?;
    let (number, multiplier) = if last.is_ascii_alphabetic() {
        let suffix = last.to_ascii_lowercase();
        let mult = SIZE_UNITS
            .iter()
            .find(|(unit, _)| *unit == suffix)
            .map(|(_, mult)| *mult)
            .ok_or_else(invalid)?;
        (trimmed[..trimmed.len() - 1].trim_end(), mult)
    } else {
        (trimmed, 1)
    };
    if !is_a_number(number) {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;
    if value < 0.0 {
        return Err(invalid());
    }
    Ok((value * multiplier as f64) as u64)
}

/// Accepts an optionally signed decimal with optional fraction and exponent.
pub fn is_a_number(input: &str) -> bool {
    let bytes = input.as_bytes();
    let mut pos = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        pos += 1;
    }
    let digits_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let digit_seen = pos > digits_start;
    if digit_seen && bytes.get(pos) == Some(&b'.') {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if digit_seen && matches!(bytes.get(pos), Some(b'e') | Some(b'E')) {
        let exponent_ok = match bytes.get(pos + 1) {
            Some(b) if b.is_ascii_digit() => true,
            Some(b'-') | Some(b'+') => bytes.get(pos + 2).is_some_and(u8::is_ascii_digit),
            _ => false,
        };
        if exponent_ok {
            pos += 2;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    digit_seen && pos == bytes.len()
}

/// Checks a volume or resource name for legal characters and length.
pub fn validate_name(name: &str) -> Result<(), EditError> {
    if let Some(ch) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && !NAME_EXTRA_CHARS.contains(*ch))
    {
        return Err(EditError::IllegalNameCharacter { ch });
    }
    if name.len() >= MAX_NAME_LENGTH {
        return Err(EditError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LENGTH,
        });
    }
    if name.is_empty() {
        return Err(EditError::EmptyName);
    }
    Ok(())
}

/// Replaces spaces so a name survives whitespace tokenisation.
pub fn escape_spaces(name: &str) -> String {
    name.replace(' ', &ESCAPED_SPACE.to_string())
}

pub fn unescape_spaces(name: &str) -> String {
    name.replace(ESCAPED_SPACE, " ")
}

/// Formats a counter with thousands separators.
pub fn add_commas(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
