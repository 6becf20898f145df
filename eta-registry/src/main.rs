use std::net::SocketAddr;
use std::sync::Arc;

use eta_registry::directory::{DirectorySourceConfig, HttpDirectorySource};
use eta_registry::eta::EtaAdapter;
use eta_registry::eta::adapters::{
    CtbAdapter, CtbConfig, GmbAdapter, GmbConfig, KmbAdapter, KmbConfig, MtrBusAdapter,
    MtrBusConfig, NlbAdapter, NlbConfig,
};
use eta_registry::registry::{Registry, RegistryConfig};
use eta_registry::storage::FileKvStore;
use eta_registry::web::{AppState, create_router};
use tracing_subscriber::EnvFilter;

/// Default location of the published dataset (checksum.md5 + data_sheet.json).
const DEFAULT_DATA_URL: &str =
    "https://raw.githubusercontent.com/LOOHP/HK-KMB-Calculator/data/data";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_url =
        std::env::var("REGISTRY_DATA_URL").unwrap_or_else(|_| DEFAULT_DATA_URL.to_string());
    let data_dir =
        std::env::var("REGISTRY_DATA_DIR").unwrap_or_else(|_| "registry-data".to_string());

    let storage = Arc::new(FileKvStore::new(&data_dir));
    let source = Arc::new(
        HttpDirectorySource::new(DirectorySourceConfig::new(&data_url))
            .expect("failed to create dataset source"),
    );

    let adapters: Vec<Arc<dyn EtaAdapter>> = vec![
        Arc::new(KmbAdapter::new(KmbConfig::default()).expect("failed to create KMB adapter")),
        Arc::new(CtbAdapter::new(CtbConfig::default()).expect("failed to create CTB adapter")),
        Arc::new(NlbAdapter::new(NlbConfig::default()).expect("failed to create NLB adapter")),
        Arc::new(
            MtrBusAdapter::new(MtrBusConfig::default())
                .expect("failed to create MTR bus adapter"),
        ),
        Arc::new(GmbAdapter::new(GmbConfig::default()).expect("failed to create GMB adapter")),
    ];

    let registry = Registry::new(RegistryConfig::default(), source, storage, adapters)
        .expect("failed to construct registry");

    // Start pulling the dataset before the first query arrives.
    registry.warm_up();

    let state = AppState::new(registry);
    let app = create_router(state);

    let addr: SocketAddr = std::env::var("REGISTRY_BIND")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .expect("invalid REGISTRY_BIND address");

    tracing::info!("transit registry listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
