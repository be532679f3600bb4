//! Chat protocol.
//!
//! A stream of records, each carrying the sender's login and one line of
//! text, in both directions:
//!
//! ```text
//! +----------------+------------------+----------------+-----------------+
//! | login len (i32)| login (UTF-8)    | text len (i32) | text (UTF-8)    |
//! +----------------+------------------+----------------+-----------------+
//! ```
//!
//! Lengths are big-endian byte counts. There is no delimiter beyond the
//! lengths. The server relays every record to every connected client; the
//! client prints what it receives and sends what is typed on the console.

pub mod client;
pub mod handler;
pub mod parser;

pub use client::{console_loop, run_client};
pub use handler::{ChatPrinter, ChatServer};
pub use parser::{Message, MessageDecoder, StringDecoder};
