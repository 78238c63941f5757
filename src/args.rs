use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "subscription-sweeper",
    about = "Remove Tableau Server subscriptions owned by unlicensed users and notify them",
    version,
    long_about = None
)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "subscription-sweeper.toml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Match and report subscriptions without deleting them or sending email
    #[arg(long)]
    pub dry_run: bool,

    /// Write a default configuration file to the --config path
    #[arg(long)]
    pub init: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_config_file() {
        let args = Args::parse_from(["subscription-sweeper"]);
        assert_eq!(args.config, PathBuf::from("subscription-sweeper.toml"));
        assert!(!args.dry_run);
        assert!(!args.init);
    }

    #[test]
    fn parses_flags() {
        let args = Args::parse_from([
            "subscription-sweeper",
            "--config",
            "/etc/sweeper.toml",
            "--dry-run",
            "-v",
        ]);
        assert_eq!(args.config, PathBuf::from("/etc/sweeper.toml"));
        assert!(args.dry_run);
        assert!(args.verbose);
    }
}
