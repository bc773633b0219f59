//! # Command Encoder
//!
//! Encodes commands into wire-format ASCII lines.

use bytes::Bytes;

use super::command::{Command, Opcode, FIELD_SEPARATOR, LINE_TERMINATOR};
use crate::error::Result;

/// Encode a raw `(opcode, productId, quantity)` triple into a command line
///
/// Accepts signed values as they arrive from the boundary layer and rejects
/// the ones the protocol cannot represent. Business-level ranges are not
/// checked here.
///
/// # Errors
///
/// Returns `InvalidArgument` if:
/// - `opcode` is not a single ASCII digit
/// - `product_id` is not a positive integer
/// - `quantity` is negative
///
/// # Examples
///
/// ```
/// use store_serial::protocol::encode_command;
///
/// let line = encode_command("5", 42, 3).unwrap();
/// assert_eq!(line, "5*42*3*\n");
/// ```
pub fn encode_command(opcode: &str, product_id: i64, quantity: i64) -> Result<String> {
    let command = Command::from_signed(Opcode::parse(opcode)?, product_id, quantity)?;
    Ok(encode_line(&command))
}

/// Render a validated command as its wire line
///
/// Integers are plain decimal: no sign, separators or leading zeros.
pub fn encode_line(command: &Command) -> String {
    format!(
        "{op}{sep}{id}{sep}{qty}{sep}{end}",
        op = command.opcode(),
        id = command.product_id(),
        qty = command.quantity(),
        sep = FIELD_SEPARATOR,
        end = LINE_TERMINATOR,
    )
}

/// Render a validated command as the bytes written to the port
pub fn encode_frame(command: &Command) -> Bytes {
    Bytes::from(encode_line(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;

    #[test]
    fn test_encode_reference_example() {
        assert_eq!(encode_command("5", 42, 3).unwrap(), "5*42*3*\n");
    }

    #[test]
    fn test_encode_rejects_negative_product_id() {
        let result = encode_command("5", -1, 3);
        assert!(matches!(result, Err(LinkError::InvalidArgument(_))));
    }

    #[test]
    fn test_encode_rejects_zero_product_id() {
        let result = encode_command("5", 0, 3);
        assert!(matches!(result, Err(LinkError::InvalidArgument(_))));
    }

    #[test]
    fn test_encode_rejects_negative_quantity() {
        let result = encode_command("5", 1, -2);
        assert!(matches!(result, Err(LinkError::InvalidArgument(_))));
    }

    #[test]
    fn test_encode_zero_quantity() {
        assert_eq!(encode_command("5", 7, 0).unwrap(), "5*7*0*\n");
    }

    #[test]
    fn test_encode_opcode_is_a_parameter() {
        assert_eq!(encode_command("3", 1, 1).unwrap(), "3*1*1*\n");
        assert!(encode_command("12", 1, 1).is_err());
    }

    #[test]
    fn test_encode_large_values_without_separators() {
        let line = encode_command("5", 1_000_000, 25_000).unwrap();
        assert_eq!(line, "5*1000000*25000*\n");

        let line = encode_command("5", i64::MAX, 0).unwrap();
        assert_eq!(line, format!("5*{}*0*\n", i64::MAX));
    }

    #[test]
    fn test_encode_frame_bytes() {
        let command = Command::new(Opcode::SELECT, 7, 2).unwrap();
        let frame = encode_frame(&command);
        assert_eq!(&frame[..], b"5*7*2*\n");
        assert!(frame.is_ascii());
    }
}
