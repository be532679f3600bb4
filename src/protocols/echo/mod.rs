//! UDP echo-plus.
//!
//! Every datagram received is sent back to its sender with each byte
//! incremented by one (wrapping), same length:
//!
//! ```text
//! Request:  [0x00, 0x41, 0xff]
//! Response: [0x01, 0x42, 0x00]
//! ```
//!
//! One socket, one reply in flight: the server waits for READ until a
//! datagram arrives, then for WRITE until the reply is sent, then for READ
//! again.

pub mod server;

pub use server::{echo_plus, UdpEchoServer};
