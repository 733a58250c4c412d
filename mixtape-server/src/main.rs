use colored::Colorize;
use log::{error, info};

use mixtape_server::{logging, run_server, Config};

#[tokio::main]
async fn main() {
    logging::init_logger();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!("{error}");
            error!(
                "{}",
                "Set the variable and try again.".bright_black().italic()
            );
            return;
        }
    };

    info!("Starting mixtape...");

    if let Err(error) = run_server(config).await {
        error!(
            "{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.",
            "mixtape failed to start!".bold().red()
        );
        error!("{error}");
        error!(
            "{}",
            format!("Hint: {}", error.hint()).bright_black().italic()
        );
    }
}
