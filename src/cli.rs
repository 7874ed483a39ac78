use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use master_core::MasterConfig;

#[derive(Debug, Parser)]
#[command(
    name = "fleetbridge",
    about = "Master control plane for a fleet of proxy engine slaves"
)]
struct RawArgs {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the master (default)
    Serve {
        /// Address to bind to
        #[arg(long, value_name = "ADDR", default_value = "0.0.0.0")]
        bind: String,
        /// Port to listen on
        #[arg(short, long, value_name = "PORT", default_value_t = 8080)]
        port: u16,
        /// Shared admin bearer token; defaults to FB_ADMIN_TOKEN, unset leaves the panel open
        #[arg(long, value_name = "TOKEN")]
        admin_token: Option<String>,
        /// Externally reachable base URL, embedded in slave install commands
        #[arg(long, value_name = "URL")]
        public_url: Option<String>,
        /// Seconds between stateless UI status broadcasts
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        status_interval: u64,
    },
    /// Run an integrity check against a database file and exit
    CheckDb {
        /// Path to the sqlite database file
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

pub enum CliConfig {
    Serve(MasterConfig),
    CheckDb(PathBuf),
}

impl CliConfig {
    pub fn parse() -> Result<Self> {
        let args = RawArgs::parse();
        let command = args.command.unwrap_or(Command::Serve {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            admin_token: None,
            public_url: None,
            status_interval: 10,
        });

        Ok(match command {
            Command::Serve {
                bind,
                port,
                admin_token,
                public_url,
                status_interval,
            } => CliConfig::Serve(MasterConfig {
                bind,
                port,
                admin_token: admin_token.or_else(|| std::env::var("FB_ADMIN_TOKEN").ok()),
                public_url,
                status_interval: Duration::from_secs(status_interval.max(1)),
            }),
            Command::CheckDb { path } => CliConfig::CheckDb(path),
        })
    }
}
