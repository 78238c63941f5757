use anyhow::{Context, Result};
use clap::Parser;
use subscription_sweeper::cleanup::notify_failure;
use subscription_sweeper::config::init_default_config;
use subscription_sweeper::notify::SmtpMailer;
use subscription_sweeper::rest::RestClient;
use subscription_sweeper::utils::setup_logging;
use subscription_sweeper::{execute, print_summary, Args, Config, RunOptions};
use tracing::{error, info};

fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        return init_default_config(&args.config);
    }

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let log_path = setup_logging(args.verbose, &config.paths.log_dir)?;
    info!(action = "start", component = "main", log_file = ?log_path, dry_run = args.dry_run, "Logging initialized");

    let mailer = SmtpMailer::new(&config.smtp);
    let client = match RestClient::new(&config.tableau) {
        Ok(client) => client,
        Err(e) => {
            error!(action = "build", component = "rest_client", error = %e, "Failed to build HTTP client");
            notify_failure(&config, &mailer, args.dry_run);
            std::process::exit(1);
        }
    };

    let options = RunOptions {
        dry_run: args.dry_run,
        ..RunOptions::default()
    };
    match execute(&config, &client, &mailer, options) {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            error!("Error: {}", e);
            eprintln!("Subscription cleanup failed: {}", e);
            std::process::exit(1);
        }
    }
}
