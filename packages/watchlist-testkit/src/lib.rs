mod error;
mod fake;
mod query;

pub use error::{Error, Result};
pub use fake::{FakeCluster, Fault, RecordedRequest};

use std::{env, future::Future, sync::Arc, thread};

use tokio::runtime::Builder;
use uuid::Uuid;

use watchlist_config::Config;
use watchlist_storage::{DocumentStore, IndexKind, Monitor, MonitorSettings};

pub const FAKE_HOST: &str = "http://fake-es:9200";

/// Store wired to a fresh [`FakeCluster`] and a private monitor.
pub fn fake_store(cfg: &Config, hosts: &[&str]) -> (Arc<FakeCluster>, Arc<DocumentStore>) {
	let cluster = Arc::new(FakeCluster::new());
	let hosts = if hosts.is_empty() {
		vec![FAKE_HOST.to_string()]
	} else {
		hosts.iter().map(|host| host.to_string()).collect()
	};
	let monitor = Arc::new(Monitor::new(MonitorSettings::from_config(&cfg.monitoring)));
	let store = DocumentStore::with_transport(cfg, hosts, cluster.clone(), monitor);

	(cluster, Arc::new(store))
}

/// Uniquely named indices on a live cluster, deleted on cleanup or drop.
pub struct TestIndices {
	config: Config,
	store: Arc<DocumentStore>,
	cleaned: bool,
}
impl TestIndices {
	pub async fn new(base_url: &str) -> Result<Self> {
		let suffix = Uuid::new_v4().simple().to_string();
		let mut config = Config::default();

		config.storage.hosts = vec![base_url.to_string()];
		config.storage.ac_index = format!("watchlist_test_ac_{suffix}");
		config.storage.vector_index = format!("watchlist_test_vectors_{suffix}");
		config.storage.patterns_index = format!("watchlist_test_patterns_{suffix}");

		let store = Arc::new(DocumentStore::connect(&config, Arc::new(Monitor::default()))?);

		store.create_all_indices().await?;

		Ok(Self { config, store, cleaned: false })
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &Arc<DocumentStore> {
		&self.store
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}

		delete_indices(&self.store).await?;

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TestIndices {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let store = self.store.clone();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test index cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(delete_indices(&store)) {
				eprintln!("Test index cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

pub fn env_es_url() -> Option<String> {
	env::var("WATCHLIST_ES_URL").ok()
}

pub async fn with_test_indices<F, Fut, T>(base_url: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestIndices) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let indices = TestIndices::new(base_url).await?;
	let result = f(&indices).await;
	let mut indices = indices;

	if let Err(err) = indices.cleanup_inner().await {
		eprintln!("Test index cleanup warning: {err}.");

		if result.is_ok() {
			return Err(err);
		}
	}

	result
}

async fn delete_indices(store: &DocumentStore) -> Result<()> {
	for kind in IndexKind::ALL {
		let name = kind.index_name(store.storage_config()).to_string();

		store.delete_index(&name).await?;
	}

	Ok(())
}
