//! # Selection Command Protocol
//!
//! ASCII line protocol understood by the store's Arduino firmware.
//!
//! This module handles:
//! - Command values (opcode, product id, quantity)
//! - Encoding commands into `{opcode}*{productId}*{quantity}*\n` lines
//! - Decoding lines back into commands for diagnostics

pub mod command;
pub mod encoder;
pub mod decoder;

pub use command::{Command, Opcode};
pub use decoder::decode_command;
pub use encoder::{encode_command, encode_frame, encode_line};
