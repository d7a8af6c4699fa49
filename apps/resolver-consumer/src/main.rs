//! Resolver Consumer - Entry Point
//!
//! Queue consumer that feeds records to the record-matching engine.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    resolver_consumer::run().await
}
