//! Basic usage examples for stagewire
//!
//! Run with: cargo run --example basic

use std::convert::Infallible;
use std::time::Duration;
use stagewire::prelude::*;

/// Example 1: Single-worker chain, output order matches input order
async fn ordered_example() -> Result<()> {
    println!("=== Ordered Chain ===");

    let mut pipeline = Pipeline::new();
    pipeline
        .next(|x: i64| Ok::<_, Infallible>(x * x), 1)?
        .next(|x: i64| Ok::<_, Infallible>(x + 1), 1)?;

    let mut sink = pipeline.emit(1..=5);
    while let Some(value) = sink.recv().await {
        println!("Value: {}", value);
    }

    println!();
    Ok(())
}

/// Example 2: Worker pools, order not preserved
async fn concurrent_example() -> Result<()> {
    println!("=== Concurrent Stages ===");

    let mut pipeline = Pipeline::with_config(PipelineConfig::default().buffer_size(4))?;
    pipeline
        .next(|s: String| Ok::<_, Infallible>(s.to_uppercase()), 2)?
        .next(|s: String| Ok::<_, Infallible>(format!("--{}--", s)), 1)?
        .next_async(
            |s: String| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, Infallible>(format!("123{}456", s))
            },
            3,
        )?;

    let words = ["alpha", "beta", "gamma", "delta"].map(String::from);
    for word in pipeline.emit(words).drain().await {
        println!("Word: {}", word);
    }

    println!();
    Ok(())
}

/// Example 3: Failures are dropped and reported
async fn error_example() -> Result<()> {
    println!("=== Error Routing ===");

    let mut pipeline = Pipeline::new();
    pipeline.next_named(
        "parse",
        from_fn(|s: String| s.trim().parse::<i64>().map(|n| (n * 2).to_string())),
        1,
    )?;
    pipeline.on_error(|err| println!("Dropped: {}", err));

    let inputs = ["1", "two", "3"].map(String::from);
    for value in pipeline.emit(inputs).drain().await {
        println!("Parsed: {}", value);
    }

    println!();
    Ok(())
}

/// Example 4: Delayed emission
async fn delay_example() -> Result<()> {
    println!("=== Delayed Emission ===");

    let mut pipeline = Pipeline::new();
    pipeline.next(|x: u32| Ok::<_, Infallible>(x), 1)?;

    let start = std::time::Instant::now();
    let mut sink = pipeline.emit_with_delay(Duration::from_millis(200), vec![1, 2, 3]);
    while let Some(value) = sink.recv().await {
        println!("{} after {:?}", value, start.elapsed());
    }

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    ordered_example().await?;
    concurrent_example().await?;
    error_example().await?;
    delay_example().await?;

    println!("All examples completed!");
    Ok(())
}
