//! Streaming input and cancellation
//!
//! Run with: cargo run --example streaming

use std::convert::Infallible;
use std::time::Duration;
use stagewire::prelude::*;
use tokio::sync::mpsc;

/// Example 1: Relay an open-ended channel through the chain
async fn channel_example() -> Result<()> {
    println!("=== Streaming From a Channel ===");

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        for i in 0..10u64 {
            if tx.send(i).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let mut pipeline = Pipeline::new();
    pipeline.next(|x: u64| Ok::<_, Infallible>(x * 100), 3)?;

    let mut sink = pipeline.emit_from_channel(rx);
    while let Some(value) = sink.recv().await {
        println!("Streamed: {}", value);
    }

    println!();
    Ok(())
}

/// Example 2: Cancel a chain fed by a source that never ends
async fn cancel_example() -> Result<()> {
    println!("=== Cancellation ===");

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut i = 0u64;
        while tx.send(i).await.is_ok() {
            i += 1;
        }
    });

    let mut pipeline = Pipeline::new();
    pipeline.next(|x: u64| Ok::<_, Infallible>(x), 2)?;

    let mut sink = pipeline.emit_from_channel(rx);
    let mut received = 0;
    while let Some(_value) = sink.recv().await {
        received += 1;
        if received == 100 {
            sink.cancel();
        }
    }
    println!("Received {} values before the chain closed", received);

    println!();
    Ok(())
}

/// Example 3: Stop everything on the first failure
async fn abort_example() -> Result<()> {
    println!("=== Abort On Error ===");

    let config = PipelineConfig::default()
        .abort_on_error(true)
        .error_handler(ErrorHandler::new(|err| println!("Aborting: {}", err)));

    let mut pipeline = Pipeline::with_config(config)?;
    pipeline.next(
        |x: u32| if x == 4 { Err("four is not allowed") } else { Ok(x) },
        1,
    )?;

    let values = pipeline.emit(0..10).drain().await;
    println!("Values before abort: {:?}", values);

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    channel_example().await?;
    cancel_example().await?;
    abort_example().await?;

    println!("All examples completed!");
    Ok(())
}
