use anyhow::Context;
use clap::{Parser, Subcommand};
use shelf_kernel::settings::Settings;

/// Operate the shelf book catalogue service
#[derive(Debug, Parser)]
#[command(name = "shelf", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load shelf settings")?;
    shelf_telemetry::init(&settings.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => shelf_app::serve(&settings).await,
        Command::Migrate => {
            let applied = shelf_app::migrate(&settings).await?;
            println!("applied {} migration(s)", applied);
            Ok(())
        }
        Command::Config => {
            println!("environment = {:?}", settings.environment);
            println!("server      = {}", settings.server.bind_address());
            println!("api_prefix  = {:?}", settings.server.api_prefix);
            println!("database    = {}", settings.database.path);
            println!("log_format  = {:?}", settings.telemetry.log_format);
            Ok(())
        }
    }
}
