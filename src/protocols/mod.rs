//! Protocol implementations.
//!
//! Each TCP protocol has a parser module with its incremental decoder and a
//! handler module plugged into the reactor.
//!
//! - `sum`: pairs of big-endian i32 answered with their sum
//! - `chat`: length-prefixed login/text records relayed to every client
//! - `http`: HTTP/1.1 response framing and a blocking GET client
//! - `echo`: UDP echo-plus served by its own single-socket loop

pub mod chat;
pub mod echo;
pub mod http;
pub mod sum;
