//! mio-based reactor.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS).
//! One thread owns the poller, the listening or connecting socket and
//! every connection; other threads reach it only through a `Notifier`.

mod event_loop;
mod notifier;

pub use event_loop::Reactor;
pub use notifier::Notifier;
