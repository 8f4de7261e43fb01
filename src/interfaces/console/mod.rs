//! JSON-lines operator console.
//!
//! One command per input line, one response per output line. Logs go to
//! stderr, so stdout carries only the protocol.

pub mod command_reader;
pub mod response_writer;
pub mod session;
