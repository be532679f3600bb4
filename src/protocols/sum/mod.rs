//! Sum protocol.
//!
//! Each request is two big-endian `i32`; the server answers with their
//! (wrapping) sum as one big-endian `i32`, one reply per request, in order.
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  00 00 00 02 | 00 00 00 03
//! Response: 00 00 00 05
//! ```
//!
//! There is no end marker: the client half-closes when done and the server
//! closes once every reply has been written. A trailing half request is
//! discarded.

pub mod handler;
pub mod parser;

pub use handler::SumServer;
pub use parser::SumDecoder;
