use anyhow::Context;
use clap::{Parser, Subcommand};
use shelf_kernel::Settings;

#[derive(Debug, Parser)]
#[command(name = "shelf", version, about = "Operate the shelf book-review service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Ensure every module's indexes exist, then exit
    Migrate,
    /// Print the effective configuration with secrets masked
    Config,
    /// Give an existing account the admin role
    Promote {
        /// Email the account registered with
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load shelf settings")?;
    shelf_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Serve => shelf_app::run(settings).await,
        Command::Migrate => {
            let applied = shelf_app::app::migrate(&settings).await?;
            tracing::info!(indexes = applied, "migrations complete");
            Ok(())
        }
        Command::Config => {
            let rendered = serde_json::to_string_pretty(&settings.redacted())
                .context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
        Command::Promote { email } => {
            let user = shelf_app::app::promote(&settings, &email).await?;
            tracing::info!(user_id = %user.id, email = %user.email, "admin role granted");
            Ok(())
        }
    }
}
