//! readyloop command-line entry point.

use readyloop::config::{Command, Config};
use readyloop::protocols::chat::{self, ChatServer};
use readyloop::protocols::echo::UdpEchoServer;
use readyloop::protocols::http;
use readyloop::protocols::sum::SumServer;
use readyloop::runtime::{Reactor, RuntimeOptions};
use std::io::Write;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        command = ?config.command,
        buffer_size = config.runtime.buffer_size,
        max_connections = config.runtime.max_connections,
        "Starting readyloop"
    );

    let options = config.runtime;
    match config.command {
        Command::SumServer { listen } => run_sum_server(listen, &options),
        Command::ChatServer { listen } => run_chat_server(listen, &options),
        Command::ChatClient { server, login } => {
            chat::run_client(server, login, &options)?;
            Ok(())
        }
        Command::UdpEcho { listen } => run_udp_echo(listen, &options),
        Command::HttpGet { host, path, port } => run_http_get(&host, port, &path, &options),
    }
}

fn run_sum_server(listen: SocketAddr, options: &RuntimeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut reactor = Reactor::bind(listen, SumServer::new(), options)?;
    info!(addr = %reactor.local_addr()?, "Sum server listening");
    reactor.run()?;
    Ok(())
}

fn run_chat_server(listen: SocketAddr, options: &RuntimeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut reactor = Reactor::bind(listen, ChatServer::new(options.buffer_size), options)?;
    info!(addr = %reactor.local_addr()?, "Chat server listening");
    reactor.run()?;
    Ok(())
}

fn run_udp_echo(listen: SocketAddr, options: &RuntimeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = UdpEchoServer::bind(listen, options)?;
    server.run()?;
    Ok(())
}

fn run_http_get(
    host: &str,
    port: u16,
    path: &str,
    options: &RuntimeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = http::fetch(host, port, path, options.buffer_size)?;
    info!(
        status = %response.header.status_line(),
        body_len = response.body.len(),
        "Response received"
    );

    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", response.header)?;
    writeln!(stdout)?;
    write!(stdout, "{}", response.text())?;
    stdout.flush()?;
    Ok(())
}
