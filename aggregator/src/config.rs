use std::net::SocketAddr;
use std::num::NonZeroUsize;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "0.0.0.0:8080")]
    pub address: SocketAddr,

    /// Path of the SQLite dedup database.
    #[envconfig(from = "DEDUP_DB", default = "./data/dedup.db")]
    pub dedup_db: String,

    /// Keep dedup state in memory only. Nothing survives a restart.
    #[envconfig(default = "false")]
    pub memory_store: bool,

    /// Unset for an unbounded queue. When set, publishers wait while it is full.
    pub queue_capacity: Option<NonZeroUsize>,

    #[envconfig(default = "5")]
    pub max_db_connections: u32,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}
