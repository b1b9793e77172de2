//! Document-store access for watchlist indices: host resolution, failover, health and mappings.

pub mod breaker;
pub mod health;
pub mod hosts;
pub mod indices;
pub mod models;
pub mod monitor;
pub mod retry;
pub mod schema;
pub mod store;
pub mod transport;

mod error;

pub use breaker::{BreakerArena, BreakerState, HostBreakerSnapshot, Permit};
pub use error::Error;
pub use health::{ClusterStatus, HealthCache, HealthReport, HostHealth};
pub use hosts::{DeploymentContext, resolve_hosts};
pub use indices::IndexHealth;
pub use models::{AcDocument, EntityMetadata, PatternDocument, PatternMeta, VectorDocument};
pub use monitor::{Alert, AlertKind, AlertLevel, Monitor, MonitorSettings, OperationSnapshot};
pub use retry::RetryPolicy;
pub use schema::IndexKind;
pub use store::{DocumentStore, Timeouts};
pub use transport::{
	BoxFuture, ClientSettings, HttpRequest, HttpResponse, Method, OpCategory, ReqwestTransport,
	Transport,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;
