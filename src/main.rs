//! # Tribo Capture
//!
//! Interactive capture console for the tribometer test rig.
//!
//! Picks a serial port, starts the capture session (framing, schema
//! tracking, quality diagnostics, resilient CSV persistence), then forwards
//! typed commands to the board while echoing the diagnostic log.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::interval;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tribo_capture::config::Config;
use tribo_capture::serial;
use tribo_capture::session::Session;

/// How often the console drains the diagnostic log
const LOG_POLL_INTERVAL_MS: u64 = 250;

#[tokio::main]
async fn main() -> Result<()> {
    // Console output plus a non-blocking trace file
    let file_appender = tracing_appender::rolling::never(".", "tribo_capture.trace.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!("Tribo Capture v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let port = match pick_port()? {
        Some(port) => port,
        None => return Ok(()),
    };

    let session = Session::new(config);
    println!("Connecting to {}...", port);
    session.connect(&port).await?;
    println!("Connected. Type commands (s, z, m <g>, ...); 'sair' to quit.");
    println!(
        "Records are appended to '{}' (or the first writable alternative).",
        session
            .active_output()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "resultados_tribometro.csv".to_string())
    );

    run_console(&session).await;

    session.disconnect().await;
    println!("Disconnected.");
    Ok(())
}

/// Choose a serial port: automatic when exactly one exists
fn pick_port() -> Result<Option<String>> {
    let ports = serial::list_ports()?;
    match ports.len() {
        0 => {
            println!("No serial port found. Connect the board and retry.");
            Ok(None)
        }
        1 => {
            println!("Using {} (only port available).", ports[0]);
            Ok(Some(ports[0].clone()))
        }
        _ => {
            println!("Available ports:");
            for (i, port) in ports.iter().enumerate() {
                println!("{}: {}", i, port);
            }
            print!("Pick a port number: ");
            use std::io::Write;
            std::io::stdout().flush()?;
            let mut choice = String::new();
            std::io::stdin().read_line(&mut choice)?;
            match choice.trim().parse::<usize>().ok().and_then(|i| ports.get(i)) {
                Some(port) => Ok(Some(port.clone())),
                None => {
                    println!("Invalid choice.");
                    Ok(None)
                }
            }
        }
    }
}

/// Forward stdin commands to the device while draining the diagnostic log
async fn run_console(session: &Session) {
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = interval(Duration::from_millis(LOG_POLL_INTERVAL_MS));
    let mut offset = 0u64;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let (entries, next) = session.poll_log(offset);
                offset = next;
                for entry in entries {
                    println!("{}", entry);
                }
                if !session.is_connected() {
                    println!("Connection lost; reconnect to resume capture.");
                    break;
                }
            }

            line = stdin_lines.next_line() => match line {
                Ok(Some(command)) => {
                    let command = command.trim().to_string();
                    if command.is_empty() {
                        continue;
                    }
                    if matches!(command.to_lowercase().as_str(), "sair" | "exit" | "quit") {
                        break;
                    }
                    if let Err(e) = session.send(&command).await {
                        eprintln!("Failed to send command: {}", e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    eprintln!("Failed to read input: {}", e);
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    // Flush whatever the reader logged between the last poll and shutdown
    let (entries, _) = session.poll_log(offset);
    for entry in entries {
        println!("{}", entry);
    }
}
