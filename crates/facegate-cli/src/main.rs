use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate face registration and authentication CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new identity from a face image
    Register {
        /// Path to an encoded image (JPEG/PNG) containing exactly one face
        image: PathBuf,
    },
    /// Authenticate a face image against registered identities
    Login {
        /// Path to an encoded image (JPEG/PNG) containing exactly one face
        image: PathBuf,
    },
    /// Show daemon status
    Status,
}

// `#[zbus::proxy]` generates `GateProxy` (async) against the daemon's
// org.facegate.Gate1 interface.
#[zbus::proxy(
    interface = "org.facegate.Gate1",
    default_service = "org.facegate.Gate1",
    default_path = "/org/facegate/Gate1"
)]
trait Gate {
    async fn register(&self, image: Vec<u8>) -> zbus::Result<String>;
    async fn authenticate(&self, image: Vec<u8>) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus (is facegated running?)")?;
    let proxy = GateProxy::new(&conn).await?;

    match cli.command {
        Commands::Register { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let reply = proxy.register(bytes).await?;
            print_outcome(&reply)?;
        }
        Commands::Login { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let reply = proxy.authenticate(bytes).await?;
            print_outcome(&reply)?;
        }
        Commands::Status => {
            let reply = proxy.status().await?;
            let status: serde_json::Value =
                serde_json::from_str(&reply).context("parsing status reply")?;
            println!("facegated {}", status["version"].as_str().unwrap_or("?"));
            println!("  models loaded:   {}", status["models_loaded"]);
            println!("  store available: {}", status["store_available"]);
            println!("  identities:      {}", status["identities"]);
            println!("  match threshold: {}", status["match_threshold"]);
        }
    }

    Ok(())
}

/// Render a register/login JSON reply for humans.
fn print_outcome(reply: &str) -> Result<()> {
    let outcome: serde_json::Value = serde_json::from_str(reply).context("parsing reply")?;
    match outcome["status"].as_str() {
        Some("registered") => println!(
            "Registered new identity: {}",
            outcome["user_id"].as_str().unwrap_or("?")
        ),
        Some("duplicate") => println!("This face is already registered"),
        Some("authenticated") => println!(
            "Authenticated as: {}",
            outcome["user_id"].as_str().unwrap_or("?")
        ),
        Some("unauthenticated") => println!("Face not recognized"),
        _ => println!("{reply}"),
    }
    Ok(())
}
