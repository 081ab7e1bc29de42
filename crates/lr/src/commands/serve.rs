//! `lr serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use lr_config::{CliSettings, Config};
use lr_server::{ServerConfig, run_server, server_config_from_lr_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover lr.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to serve and watch (overrides config).
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Environment name; anything but "development" or "dev" disables live reload.
    #[arg(long = "env", env = "LR_ENV")]
    environment: Option<String>,

    /// Enable verbose output (show change and broadcast logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            root: self.root,
            environment: self.environment,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        if let Some(path) = &config.config_path {
            tracing::debug!(path = %path.display(), "Loaded configuration");
        }

        let server_config = server_config_from_lr_config(&config);
        print_startup(&output, &server_config);

        run_server(server_config).await?;

        Ok(())
    }
}

fn print_startup(output: &Output, config: &ServerConfig) {
    output.highlight(&format!(
        "Serving {} on http://{}:{}",
        config.root.display(),
        config.host,
        config.port
    ));

    if config.mode.is_development() {
        output.info(&format!("Live reload: enabled ({})", config.endpoint));
        if !config.patterns.is_empty() {
            output.info(&format!("Watching: {}", config.patterns.join(", ")));
        }
    } else {
        output.warning(&format!("Live reload: disabled ({} mode)", config.mode));
    }
}
