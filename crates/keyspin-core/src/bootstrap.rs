use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use keyspin_cache::{Counter, MemoryCache, RedisCounter};
use keyspin_common::GlobalConfig;
use keyspin_storage::SeaOrmConfigStore;

use crate::state::AppState;
use crate::upstream::{UpstreamClientConfig, WreqUpstreamClient};

#[derive(Debug, Clone, Parser)]
#[command(name = "keyspin", version, about = "Key-rotating LLM reverse proxy")]
pub struct CliArgs {
    /// Database DSN (SQLite file by default).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://keyspin.db?mode=rwc"
    )]
    pub dsn: String,

    /// Bind host.
    #[arg(long, env = "KEYSPIN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port.
    #[arg(long, env = "BACKEND_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Comma-separated inbound proxy credentials.
    #[arg(long, env = "GLOBAL_PROXY_KEYS", default_value = "your-global-proxy-key")]
    pub global_proxy_keys: String,

    /// Base URL echoed to the admin UI.
    #[arg(long, env = "PROXY_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Redis URL; set it to share the rotation counter across processes.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Upstream round-trip budget in seconds.
    #[arg(long, env = "PROXY_TIMEOUT", default_value_t = 300)]
    pub proxy_timeout: u64,
}

impl CliArgs {
    fn into_global(self) -> GlobalConfig {
        let port = self.port;
        let public_base_url = self
            .public_base_url
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        GlobalConfig {
            host: self.host,
            port: self.port,
            global_proxy_keys: self.global_proxy_keys,
            public_base_url,
            dsn: self.dsn,
            redis_url: self.redis_url,
            proxy_timeout_secs: self.proxy_timeout,
        }
    }
}

pub struct Bootstrap {
    pub state: Arc<AppState>,
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    bootstrap(CliArgs::parse()).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let global = args.into_global();

    let db = keyspin_storage::connect(&global.dsn)
        .await
        .context("connect storage")?;
    keyspin_storage::sync_schema(&db).await.context("schema sync")?;
    let store = Arc::new(SeaOrmConfigStore::new(db));

    // Redis when configured, the in-process counter otherwise; both
    // satisfy atomic incr, only persistence differs.
    let counter: Arc<dyn Counter> = match &global.redis_url {
        Some(url) => {
            let redis = RedisCounter::connect(url).await.context("connect redis")?;
            redis.ping().await.context("redis ping")?;
            Arc::new(redis)
        }
        None => Arc::new(MemoryCache::new()),
    };

    let upstream = WreqUpstreamClient::new(UpstreamClientConfig::from_global(&global))
        .context("build upstream client")?;

    let state = AppState::new(global, store, counter, Arc::new(upstream));
    Ok(Bootstrap {
        state: Arc::new(state),
    })
}
