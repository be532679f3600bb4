//! Interactive chat client.
//!
//! The event loop owns the socket and prints incoming records. A separate
//! console thread reads lines from stdin and hands each one to the loop
//! through the notifier, which wakes the poller.

use super::handler::ChatPrinter;
use super::parser::Message;
use crate::runtime::{Notifier, Reactor, RuntimeOptions};
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::thread;
use tracing::{debug, info, warn};

/// Connect to `addr` and chat as `login` until the server goes away.
pub fn run_client(addr: SocketAddr, login: String, options: &RuntimeOptions) -> io::Result<()> {
    let printer = ChatPrinter::stdout(options.buffer_size);
    let mut reactor = Reactor::connect(addr, printer, options)?;
    let notifier = reactor.notifier();

    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || console_loop(io::stdin().lock(), &login, &notifier))?;

    info!(addr = %addr, "Chat client started");
    reactor.run()
}

/// Forward every line of `input` as a message from `login`.
///
/// Returns once input is exhausted or the event loop is gone.
pub fn console_loop<R: BufRead>(input: R, login: &str, notifier: &Notifier<Message>) {
    for line in input.lines() {
        let text = match line {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Console read failed");
                break;
            }
        };
        if let Err(e) = notifier.send(Message::new(login, text)) {
            debug!(error = %e, "Event loop no longer accepting input");
            break;
        }
    }
    debug!("Console input finished");
}
