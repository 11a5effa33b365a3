//! Object pool example: reuse buffers across threads
//!
//! Run with: cargo run --example pool
//!
//! Pool misses and discards are logged at trace level:
//! RUST_LOG=sqlx_format_bind=trace cargo run --example pool

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use sqlx_format_bind::pool::FromContext;
use sqlx_format_bind::ObjectPool;
use tracing_subscriber::EnvFilter;

/// A reusable encoder bound to a shared configuration.
#[derive(Debug)]
struct Encoder {
    buffer: Vec<u8>,
    line_width: usize,
}

#[derive(Debug)]
struct EncoderConfig {
    line_width: usize,
}

impl FromContext<EncoderConfig> for Encoder {
    fn from_context(config: &EncoderConfig) -> Self {
        Encoder {
            buffer: Vec::with_capacity(config.line_width),
            line_width: config.line_width,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sqlx_format_bind=debug")),
        )
        .init();

    // Example 1: Default-constructed buffers, cleared on return
    println!("--- Example 1: Scratch strings ---");
    let strings = ObjectPool::<String>::builder(2)
        .default_constructor()
        .recycle(|s| {
            s.clear();
            true
        })
        .build();
    {
        let mut a = strings.borrow()?;
        a.push_str("hello");
        let b = strings.borrow()?;
        println!("borrowed {:?} and {:?}", *a, *b);
    }
    println!("{:?}", strings);

    // Example 2: Context-aware construction, shared across threads
    println!("\n--- Example 2: Encoders from a shared config ---");
    let encoders = Arc::new(
        ObjectPool::<Encoder>::builder(4)
            .context(EncoderConfig { line_width: 76 })
            .recycle(|e| {
                e.buffer.clear();
                e.buffer.capacity() <= 4 * e.line_width
            })
            .build(),
    );
    let encoded = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let encoders = Arc::clone(&encoders);
            let encoded = Arc::clone(&encoded);
            thread::spawn(move || -> sqlx_format_bind::Result<()> {
                for round in 0..100 {
                    let mut encoder = encoders.borrow()?;
                    let line = format!("worker {worker} round {round}");
                    encoder.buffer.extend_from_slice(line.as_bytes());
                    encoded.fetch_add(encoder.buffer.len(), Ordering::Relaxed);
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().map_err(|_| "worker panicked")??;
    }
    println!(
        "encoded {} bytes, {} encoders idle",
        encoded.load(Ordering::Relaxed),
        encoders.available()
    );

    // Example 3: Taking an instance out of circulation
    println!("\n--- Example 3: Detaching ---");
    let kept = encoders.borrow()?.detach();
    println!(
        "detached encoder (line width {}), {} encoders idle",
        kept.line_width,
        encoders.available()
    );

    Ok(())
}
