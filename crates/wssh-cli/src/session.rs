//! Run one wssh session against the local terminal.
//!
//! Interactive sessions put the terminal in raw mode and pipe keystrokes to
//! the remote shell; resize events are forwarded. With a remote command the
//! output is streamed to stdout until the gateway closes the session, and
//! piped stdin is forwarded to the command. There is no end-of-input signal
//! on the wire, so reaching the end of stdin only stops forwarding.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::tty::IsTty;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wssh_client::{Callbacks, ClientSession, ConnectionConfig, SessionEvent};

use crate::terminal as term;

enum Input {
    Bytes(Vec<u8>),
    Resize(u16, u16),
    Quit,
}

/// Connect with `config` and relay until the session ends.
pub async fn run(config: ConnectionConfig, interactive: bool) -> Result<()> {
    let host = config.hostname.clone();
    let (callbacks, mut events) = Callbacks::channel();
    let session = ClientSession::new(callbacks);
    session.connect(config)?;

    match events.recv().await {
        Some(SessionEvent::Connected) => info!("session established"),
        Some(SessionEvent::Error(e)) => {
            return Err(e).with_context(|| format!("failed to connect to {host}"))
        }
        Some(SessionEvent::Closed) | None => anyhow::bail!("connection to {host} closed"),
        Some(SessionEvent::Data(_)) => anyhow::bail!("gateway sent data before the session was established"),
    }

    let (input_tx, mut input_rx) = mpsc::channel::<Input>(64);
    let guard = if interactive {
        let guard = term::RawModeGuard::enter()?;
        spawn_input_reader(input_tx);
        Some(guard)
    } else {
        if std::io::stdin().is_tty() {
            drop(input_tx);
        } else {
            std::thread::spawn(move || forward_input(std::io::stdin().lock(), input_tx));
        }
        None
    };

    let mut stdout = std::io::stdout();
    let mut input_open = true;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Data(bytes)) => {
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
                Some(SessionEvent::Error(e)) => break Err(e),
                Some(SessionEvent::Closed) | None => break Ok(()),
                Some(SessionEvent::Connected) => {}
            },
            input = input_rx.recv(), if input_open => match input {
                Some(Input::Bytes(bytes)) => {
                    if let Err(e) = session.send(&bytes) {
                        debug!("dropping input: {e}");
                    }
                }
                Some(Input::Resize(cols, rows)) => {
                    debug!(cols, rows, "terminal resized");
                    if let Err(e) = session.resize(cols, rows) {
                        debug!("dropping resize: {e}");
                    }
                }
                Some(Input::Quit) => {
                    info!("disconnect requested");
                    input_open = false;
                    session.close();
                }
                None if interactive => {
                    input_open = false;
                    session.close();
                }
                None => {
                    debug!("end of piped input");
                    input_open = false;
                }
            },
        }
    };

    drop(guard);
    outcome.with_context(|| format!("connection to {host} lost"))?;
    if interactive {
        eprintln!("\r\nConnection to {host} closed.");
    }
    Ok(())
}

/// Read crossterm events on a detached thread until Ctrl+], an error, or
/// the session loop going away.
fn spawn_input_reader(tx: mpsc::Sender<Input>) {
    std::thread::spawn(move || loop {
        if tx.is_closed() {
            return;
        }
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!("terminal event error: {e}");
                return;
            }
        }
        let input = match event::read() {
            Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                if term::is_escape(&key) {
                    let _ = tx.blocking_send(Input::Quit);
                    return;
                }
                match term::key_event_to_bytes(&key) {
                    Some(bytes) => Input::Bytes(bytes),
                    None => continue,
                }
            }
            Ok(Event::Paste(text)) => Input::Bytes(text.into_bytes()),
            Ok(Event::Resize(cols, rows)) => Input::Resize(cols, rows),
            Ok(_) => continue,
            Err(e) => {
                warn!("terminal event error: {e}");
                return;
            }
        };
        if tx.blocking_send(input).is_err() {
            return;
        }
    });
}

/// Forward `reader` to the session in chunks until end of input, a read
/// error, or the session loop going away.
fn forward_input(mut reader: impl Read, tx: mpsc::Sender<Input>) {
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("stdin read error: {e}");
                return;
            }
        };
        if tx.blocking_send(Input::Bytes(buf[..n].to_vec())).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(mut rx: mpsc::Receiver<Input>) -> Vec<u8> {
        let mut bytes = Vec::new();
        while let Some(input) = rx.blocking_recv() {
            match input {
                Input::Bytes(chunk) => bytes.extend(chunk),
                _ => panic!("stdin produced a non-byte input"),
            }
        }
        bytes
    }

    #[test]
    fn piped_input_is_forwarded_until_eof() {
        let (tx, rx) = mpsc::channel(64);
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        forward_input(Cursor::new(data.clone()), tx);
        assert_eq!(collect(rx), data);
    }

    #[test]
    fn empty_input_sends_nothing() {
        let (tx, rx) = mpsc::channel(64);
        forward_input(Cursor::new(Vec::new()), tx);
        assert!(collect(rx).is_empty());
    }

    #[test]
    fn stops_when_the_session_loop_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        forward_input(Cursor::new(vec![1u8; 32]), tx);
    }
}
