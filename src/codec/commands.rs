//! Command records and the command-log delimiter scheme.
//!
//! A command record is `key + KEY_DELIMITER + payload`. The log is every
//! record followed by `COMMAND_DELIMITER`, so a decoded log always ends in an
//! empty tail entry. There is no escaping: keys and payloads must never
//! contain either delimiter or any section marker.

use super::sections::SectionName;
use crate::error::{Result, SnapshotError};
use crate::types::{COMMAND_DELIMITER, KEY_DELIMITER};

/// Key of a command record: everything before the first `KEY_DELIMITER`.
///
/// Returns `None` for records without a key delimiter, including the empty
/// tail entry of a decoded log.
pub fn command_key(record: &str) -> Option<&str> {
    record.split_once(KEY_DELIMITER).map(|(key, _)| key)
}

/// Split a command record into key and payload.
pub fn split_command(record: &str) -> Option<(&str, &str)> {
    record.split_once(KEY_DELIMITER)
}

/// Build a command record, rejecting parts that would corrupt the framing.
pub fn compose_command(key: &str, payload: &str) -> Result<String> {
    check_part("key", key)?;
    check_part("payload", payload)?;
    Ok(format!("{}{}{}", key, KEY_DELIMITER, payload))
}

fn check_part(what: &str, part: &str) -> Result<()> {
    for delimiter in [KEY_DELIMITER, COMMAND_DELIMITER] {
        if part.contains(delimiter) {
            return Err(SnapshotError::Validation(format!(
                "command {} contains reserved delimiter {}",
                what, delimiter
            )));
        }
    }
    for section in SectionName::ALL {
        for marker in [section.start_marker(), section.end_marker()] {
            if part.contains(marker) {
                return Err(SnapshotError::Validation(format!(
                    "command {} contains section marker {}",
                    what, marker
                )));
            }
        }
    }
    Ok(())
}

/// Split a data section into records, in file order.
///
/// The trailing delimiter produces a final empty entry; callers skip it.
pub fn decode_command_log(slice: &str) -> Vec<&str> {
    slice.split(COMMAND_DELIMITER).collect()
}

/// Join records into a data section body, with a delimiter after each one.
pub fn encode_command_log<I, S>(records: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for record in records {
        out.push_str(record.as_ref());
        out.push_str(COMMAND_DELIMITER);
    }
    out
}
