//! Funnel Analysis API Server Binary
//!
//! Run with: `cargo run --bin funnel-server`

use funnel_analytics::{run_server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing is initialized in run_server(); RUST_LOG controls levels:
    //   RUST_LOG=debug cargo run --bin funnel-server
    //   RUST_LOG=funnel_analytics::runner=trace cargo run --bin funnel-server
    let config = ServerConfig::from_env();

    println!("Starting Funnel Analysis API Server...");
    println!("   Host: {}", config.host);
    println!("   Port: {}", config.port);
    match &config.rules_path {
        Some(path) => println!("   Rules: {}", path.display()),
        None => println!("   Rules: embedded default table"),
    }
    println!(
        "   Limits: {} steps, {:?} per traversal, {} scenario workers",
        config.engine.limits.max_steps, config.engine.limits.max_duration, config.engine.max_workers
    );
    println!();
    println!("Available endpoints:");
    println!("  GET  /health           - Health check");
    println!("  GET  /analysis-types   - Loaded rule table");
    println!("  POST /analyze          - Run an analysis");
    println!("  POST /parse            - Parse a query");
    println!();

    run_server(config).await?;

    Ok(())
}
