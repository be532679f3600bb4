//! readyloop: readiness-driven network endpoints
//!
//! A single-threaded mio event loop multiplexes many sockets, each owned by
//! a buffered connection state machine that frames messages incrementally
//! from a byte stream that may arrive in arbitrary fragments.
//!
//! Endpoints:
//! - Sum server (fixed-size binary records)
//! - Chat server and console client (length-prefixed strings)
//! - UDP echo-plus server
//! - Blocking HTTP/1.1 GET client

pub mod config;
pub mod protocols;
pub mod runtime;
