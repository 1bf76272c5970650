//! # skiff-proto
//!
//! Wire-protocol vocabulary shared by the skiff server and any client
//! implementation.
//!
//! The protocol is newline-terminated ASCII: the first whitespace-delimited
//! token of a line is the verb (case-insensitive), the remainder after the
//! first space is the argument string, passed verbatim.  UPLOAD and DOWNLOAD
//! switch the connection into raw binary framing: one decimal size line
//! followed by exactly that many payload bytes, with no delimiter.
//!
//! This crate is pure data and parsing; it performs no I/O.

pub mod command;
pub mod filename;
pub mod outcome;

pub use command::{parse_line, Command, ParsedLine, Verb};
pub use filename::{validate_filename, FilenameError};
pub use outcome::{fail_tag, ok_tag, ok_tag_with, FailReason};
