use anyhow::{anyhow, Result};
use tracing::error;

use okra_runtime::cli::build_cli;
use okra_runtime::config::Config;
use okra_runtime::tracing::setup_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("serve", serve_matches)) => {
            let config = Config::from_args(serve_matches)?;
            setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

            if let Err(e) = okra_runtime::run(config).await {
                error!(error = %e, "fatal error");
                return Err(e);
            }
            Ok(())
        }
        _ => Err(anyhow!("no subcommand given, expected `serve`")),
    }
}
