mod cli;

use crate::cli::CliConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    match CliConfig::parse()? {
        CliConfig::Serve(config) => master_core::run_master(config).await?,
        CliConfig::CheckDb(path) => {
            state_store::validate_db(&path).await?;
            println!("ok");
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}
