//! # Command Decoder
//!
//! Parses command lines back into commands. The firmware never answers, so
//! this is only used for diagnostics and to check what was sent.

use super::command::{Command, Opcode, FIELD_SEPARATOR, LINE_TERMINATOR};
use crate::error::{LinkError, Result};

/// Decode a command line
///
/// # Arguments
///
/// * `line` - A line such as `"5*42*3*\n"` (the terminator is optional)
///
/// # Returns
///
/// * `Result<Command>` - Decoded command, or error if malformed
///
/// # Errors
///
/// Returns `InvalidArgument` if:
/// - The line does not have exactly three `*`-terminated fields
/// - A numeric field is not canonical decimal (sign, leading zero, empty)
/// - The product id is zero
pub fn decode_command(line: &str) -> Result<Command> {
    let body = line.strip_suffix(LINE_TERMINATOR).unwrap_or(line);

    let fields: Vec<&str> = body.split(FIELD_SEPARATOR).collect();
    if fields.len() != 4 || !fields[3].is_empty() {
        return Err(LinkError::InvalidArgument(format!(
            "malformed command line: {:?}",
            line
        )));
    }

    let opcode = Opcode::parse(fields[0])?;
    let product_id = parse_decimal(fields[1], "product id")?;
    let quantity = parse_decimal(fields[2], "quantity")?;

    Command::new(opcode, product_id, quantity)
}

/// Parse a canonical unsigned decimal field
fn parse_decimal(field: &str, name: &str) -> Result<u64> {
    let canonical = !field.is_empty()
        && field.bytes().all(|b| b.is_ascii_digit())
        && (field == "0" || !field.starts_with('0'));

    if !canonical {
        return Err(LinkError::InvalidArgument(format!(
            "{} is not a plain decimal: {:?}",
            name, field
        )));
    }

    field
        .parse::<u64>()
        .map_err(|e| LinkError::InvalidArgument(format!("{} out of range: {}", name, e)))
}
