//! `livedev serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use livedev_config::{CliSettings, Config};
use livedev_server::{run_server, server_config_from_livedev_config, shutdown_signal};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover livedev.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Site root directory (overrides config).
    #[arg(short, long)]
    root_dir: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output (request and reload logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable live reload (default: enabled).
    #[arg(long)]
    live_reload: Option<bool>,

    /// Disable live reload.
    #[arg(long, conflicts_with = "live_reload")]
    no_live_reload: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the server fails to start,
    /// or shutdown does not finish within the grace period.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let live_reload_enabled = self.resolve_live_reload_enabled();
        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            root_dir: self.root_dir,
            live_reload_enabled,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        // Print startup info
        output.highlight(&format!("livedev {VERSION}"));
        if let Some(path) = &config.config_path {
            output.field("Config", &path.display().to_string());
        }
        output.field(
            "Root",
            &config.site_resolved.root_dir.display().to_string(),
        );
        output.field(
            "Address",
            &format!("http://{}:{}/", config.server.host, config.server.port),
        );
        output.field("Render", &config.render.command);
        if config.live_reload.enabled {
            output.field("Live reload", "enabled");
        } else {
            output.warning("Live reload is disabled; pages will not refresh on change");
        }

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });

        run_server(server_config_from_livedev_config(&config), shutdown).await?;

        Ok(())
    }

    /// Resolve `live_reload_enabled` from --live-reload/--no-live-reload flags.
    fn resolve_live_reload_enabled(&self) -> Option<bool> {
        self.no_live_reload.then_some(false).or(self.live_reload)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(flags: &[&str]) -> ServeArgs {
        let argv = std::iter::once("serve").chain(flags.iter().copied());
        Harness::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_live_reload_default_is_unset() {
        assert_eq!(parse(&[]).resolve_live_reload_enabled(), None);
    }

    #[test]
    fn test_no_live_reload() {
        assert_eq!(
            parse(&["--no-live-reload"]).resolve_live_reload_enabled(),
            Some(false)
        );
    }

    #[test]
    fn test_live_reload_explicit() {
        assert_eq!(
            parse(&["--live-reload", "true"]).resolve_live_reload_enabled(),
            Some(true)
        );
    }

    #[test]
    fn test_overrides_parsed() {
        let args = parse(&["-r", "site", "--host", "0.0.0.0", "-p", "9000"]);

        assert_eq!(args.root_dir, Some(PathBuf::from("site")));
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(9000));
    }
}
