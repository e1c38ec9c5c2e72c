use anyhow::Context;
use clap::Parser;
use log::error;

use depindexd::{Config, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();

    let server = Server::new(config);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = server.run(shutdown).await {
        error!("{err:#}");
        return Err(anyhow::anyhow!(err)).context("server exited with an error");
    }

    Ok(())
}
