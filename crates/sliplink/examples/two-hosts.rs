//! Two hosts joined by an in-memory serial line, one datagram each way.
//!
//! Run with:
//!   cargo run --example two-hosts
//!
//! Set `SLIPLINK_LOG_JSON=1` for JSON log lines.

use std::sync::{mpsc, Arc};
use std::time::Duration;

use sliplink::transport::{MemoryLine, SerialLine};
use sliplink::LinkMultiplexer;
use tracing::level_filters::LevelFilter;

fn init_logging() {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::DEBUG)
        .with_ansi(false)
        .with_target(false);

    if std::env::var_os("SLIPLINK_LOG_JSON").is_some() {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let (a_end, b_end) = MemoryLine::pair();
    let a_end: Arc<dyn SerialLine> = Arc::new(a_end.with_name("ttyA"));
    let b_end: Arc<dyn SerialLine> = Arc::new(b_end.with_name("ttyB"));

    // Host A (10.0.0.1) reaches host B (10.0.0.2) over its end of the line.
    let host_a = LinkMultiplexer::new([("10.0.0.2", a_end)])?;
    let host_b = LinkMultiplexer::new([("10.0.0.1", b_end)])?;

    let (tx, rx) = mpsc::channel();
    let tx_b = tx.clone();
    host_a.register_receiver(move |datagram| {
        tx.send(("A", datagram))?;
        Ok(())
    });
    host_b.register_receiver(move |datagram| {
        tx_b.send(("B", datagram))?;
        Ok(())
    });

    host_a.send(b"hello from A \xc0\xdb", "10.0.0.2")?;
    host_b.send(b"hello from B", "10.0.0.1")?;

    for _ in 0..2 {
        let (host, datagram) = rx.recv_timeout(Duration::from_secs(1))?;
        eprintln!("host {host} received {datagram:02x?}");
    }

    if let Err(err) = host_a.send(b"nobody home", "10.0.0.9") {
        eprintln!("expected failure: {err}");
    }

    Ok(())
}
