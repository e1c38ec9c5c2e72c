//! CLI surface (§9A.1). Out of the hard-engineering core, but still a real,
//! working boundary: bind address, verbosity, and shutdown behavior.

use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "depindexd", about = "Concurrent package dependency index server")]
pub struct Config {
    /// Address to bind the listener to.
    #[arg(short, long, default_value = "127.0.0.1")]
    pub bind: String,

    /// TCP port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Maximum number of simultaneously open connections (unlimited if unset).
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Seconds to wait for in-flight sessions to drain on shutdown.
    #[arg(long, default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Increase logging verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Maps repeated `-v` flags to a level filter, starting from `warn`.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
