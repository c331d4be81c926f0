use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use enex2md::{App, Commands, Config};

/// Main CLI application arguments and command structure
#[derive(Parser)]
#[clap(version, about = "Convert Evernote export archives to Markdown")]
struct Cli {
    /// Path to the configuration file
    #[clap(short = 'c', long, value_parser)]
    config: Option<PathBuf>,

    /// Verbose output mode
    #[clap(short, long)]
    verbose: bool,

    /// Subcommands for the enex2md application
    #[clap(subcommand)]
    command: Commands,
}

fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();
}

fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let app = App::new(config, cli.verbose);
    if let Err(e) = app.run(cli.command) {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Done");
}
