//! # Protocol Constants and Types
//!
//! Core definitions for the selection command line protocol.

use std::fmt;

use crate::error::{LinkError, Result};

/// Separator between fields of a command line
pub const FIELD_SEPARATOR: char = '*';

/// Terminator of every command line
pub const LINE_TERMINATOR: char = '\n';

/// Opcode the firmware interprets as "product selected" (light LED / print label)
pub const OPCODE_SELECT: &str = "5";

/// Leading protocol field selecting the firmware-side action
///
/// Always a single ASCII digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(u8);

impl Opcode {
    /// The select/print opcode (`5`)
    pub const SELECT: Opcode = Opcode(b'5');

    /// Parse an opcode from its textual form
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` unless `value` is exactly one ASCII digit.
    pub fn parse(value: &str) -> Result<Self> {
        match value.as_bytes() {
            [digit] if digit.is_ascii_digit() => Ok(Opcode(*digit)),
            _ => Err(LinkError::InvalidArgument(format!(
                "opcode must be a single digit, got {:?}",
                value
            ))),
        }
    }

    /// The opcode as a character
    pub fn as_char(&self) -> char {
        self.0 as char
    }
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::SELECT
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A single command for the firmware
///
/// Constructed at send time and never mutated. Product ids start at 1,
/// quantities may be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    product_id: u64,
    quantity: u64,
}

impl Command {
    /// Build a command, rejecting values the protocol cannot carry
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `product_id` is zero.
    pub fn new(opcode: Opcode, product_id: u64, quantity: u64) -> Result<Self> {
        if product_id == 0 {
            return Err(LinkError::InvalidArgument(
                "product id must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            opcode,
            product_id,
            quantity,
        })
    }

    /// Build a command from signed values as they arrive from callers
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `product_id` is not positive or
    /// `quantity` is negative.
    pub fn from_signed(opcode: Opcode, product_id: i64, quantity: i64) -> Result<Self> {
        let product_id = u64::try_from(product_id).map_err(|_| {
            LinkError::InvalidArgument(format!("product id must be positive, got {}", product_id))
        })?;
        let quantity = u64::try_from(quantity).map_err(|_| {
            LinkError::InvalidArgument(format!("quantity must not be negative, got {}", quantity))
        })?;

        Self::new(opcode, product_id, quantity)
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn product_id(&self) -> u64 {
        self.product_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_parse_single_digit() {
        assert_eq!(Opcode::parse("5").unwrap(), Opcode::SELECT);
        assert_eq!(Opcode::parse("0").unwrap().as_char(), '0');
        assert_eq!(Opcode::parse("9").unwrap().to_string(), "9");
    }

    #[test]
    fn test_opcode_parse_rejects_invalid() {
        for value in ["", "55", "a", " 5", "5\n", "*"] {
            assert!(
                matches!(Opcode::parse(value), Err(LinkError::InvalidArgument(_))),
                "{:?} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_opcode_default_is_select() {
        assert_eq!(Opcode::default(), Opcode::SELECT);
        assert_eq!(Opcode::SELECT.to_string(), OPCODE_SELECT);
    }

    #[test]
    fn test_command_rejects_zero_product_id() {
        let result = Command::new(Opcode::SELECT, 0, 1);
        assert!(matches!(result, Err(LinkError::InvalidArgument(_))));
    }

    #[test]
    fn test_command_accepts_zero_quantity() {
        let command = Command::new(Opcode::SELECT, 12, 0).unwrap();
        assert_eq!(command.product_id(), 12);
        assert_eq!(command.quantity(), 0);
        assert_eq!(command.opcode(), Opcode::SELECT);
    }

    #[test]
    fn test_from_signed_rejects_negatives() {
        assert!(Command::from_signed(Opcode::SELECT, -3, 1).is_err());
        assert!(Command::from_signed(Opcode::SELECT, 3, -1).is_err());
        assert!(Command::from_signed(Opcode::SELECT, 0, 1).is_err());

        let command = Command::from_signed(Opcode::SELECT, 3, 0).unwrap();
        assert_eq!((command.product_id(), command.quantity()), (3, 0));
    }
}
