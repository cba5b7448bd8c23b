use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use curfew_core::{
    config::Config,
    store::{FileKv, KvBackend, MemoryKv, PolicyStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    curfew_core::logging::init("curfew")?;

    let cfg = Arc::new(Config::load()?);

    let backend: Arc<dyn KvBackend> = match &cfg.store_path {
        Some(path) => {
            let kv = FileKv::open(path).await?;
            tracing::info!(path = %kv.path().display(), "using file-backed policy store");
            Arc::new(kv)
        }
        None => {
            tracing::warn!("STORE_PATH not set, moderation settings will not survive a restart");
            Arc::new(MemoryKv::default())
        }
    };
    let store = Arc::new(PolicyStore::new(backend, cfg.store_namespace.clone()));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("Ctrl-C received, shutting down");
        on_signal.cancel();
    });

    curfew_telegram::router::run_polling(cfg, store, cancel).await
}
