use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = config::Config::from_env();
    let engine = engine::spawn_engine(&config);

    let service = dbus_interface::GateService::new(engine);
    let _conn = zbus::connection::Builder::session()?
        .name("org.facegate.Gate1")?
        .serve_at("/org/facegate/Gate1", service)?
        .build()
        .await?;

    tracing::info!("facegated ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
