use std::{collections::HashMap, fs, future::Future, pin::Pin, time::Duration};

use reqwest::{
	Certificate, Client, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	Get,
	Head,
	Put,
	Post,
	Delete,
}

/// Operation category. Each category has its own timeout and client pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCategory {
	Health,
	Search,
	Index,
}
impl OpCategory {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Health => "health",
			Self::Search => "search",
			Self::Index => "index",
		}
	}
}

#[derive(Clone, Debug)]
pub struct HttpRequest {
	pub host: String,
	pub method: Method,
	pub path: String,
	pub body: Option<Value>,
	pub category: OpCategory,
	pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
	pub status: u16,
	pub body: Value,
}
impl HttpResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Short reason for a failed response, taken from the store's error envelope when present.
	pub fn error_reason(&self) -> String {
		self.body
			.pointer("/error/type")
			.and_then(Value::as_str)
			.map(|kind| {
				let reason = self.body.pointer("/error/reason").and_then(Value::as_str);

				match reason {
					Some(reason) => format!("{kind}: {reason}"),
					None => kind.to_string(),
				}
			})
			.unwrap_or_else(|| format!("status {}", self.status))
	}
}

/// Sends one request to one host. Non-2xx responses are returned, not raised.
pub trait Transport
where
	Self: Send + Sync,
{
	fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse>>;
}

#[derive(Clone, Debug, Default)]
pub struct ClientSettings {
	pub username: Option<String>,
	pub password: Option<String>,
	pub api_key: Option<String>,
	pub tls_verify: bool,
	pub ca_cert_pem: Option<Vec<u8>>,
}
impl ClientSettings {
	pub fn from_config(cfg: &watchlist_config::Storage) -> Result<Self> {
		let ca_cert_pem = match cfg.ca_cert_path.as_ref() {
			Some(path) => Some(fs::read(path).map_err(|err| Error::InvalidConfig {
				message: format!("Failed to read CA bundle at {path:?}: {err}."),
			})?),
			None => None,
		};

		Ok(Self {
			username: cfg.username.clone(),
			password: cfg.password.clone(),
			api_key: cfg.api_key.clone(),
			tls_verify: cfg.tls_verify,
			ca_cert_pem,
		})
	}
}

/// `reqwest` transport with one lazily built client per host and operation category.
pub struct ReqwestTransport {
	settings: ClientSettings,
	clients: RwLock<HashMap<(String, OpCategory), Client>>,
}
impl ReqwestTransport {
	pub fn new(settings: ClientSettings) -> Self {
		Self { settings, clients: RwLock::new(HashMap::new()) }
	}

	async fn client_for(&self, host: &str, category: OpCategory) -> Result<Client> {
		let key = (host.to_string(), category);

		if let Some(client) = self.clients.read().await.get(&key) {
			return Ok(client.clone());
		}

		let mut clients = self.clients.write().await;

		if let Some(client) = clients.get(&key) {
			return Ok(client.clone());
		}

		let client = self.build_client(category)?;

		clients.insert(key, client.clone());

		Ok(client)
	}

	fn build_client(&self, category: OpCategory) -> Result<Client> {
		let mut headers = HeaderMap::new();

		if let Some(key) = self.settings.api_key.as_deref() {
			let value = HeaderValue::from_str(&format!("ApiKey {key}")).map_err(|err| {
				Error::InvalidConfig { message: format!("Invalid storage.api_key: {err}.") }
			})?;

			headers.insert(AUTHORIZATION, value);
		}

		let mut builder = Client::builder()
			.default_headers(headers)
			.danger_accept_invalid_certs(!self.settings.tls_verify);

		if category == OpCategory::Health {
			builder = builder.pool_max_idle_per_host(1);
		}
		if let Some(pem) = self.settings.ca_cert_pem.as_deref() {
			let cert = Certificate::from_pem(pem).map_err(|err| Error::InvalidConfig {
				message: format!("Invalid CA bundle: {err}."),
			})?;

			builder = builder.add_root_certificate(cert);
		}

		builder
			.build()
			.map_err(|err| Error::InvalidConfig { message: format!("Failed to build client: {err}.") })
	}

	async fn send_inner(&self, request: HttpRequest) -> Result<HttpResponse> {
		let client = self.client_for(&request.host, request.category).await?;
		let url = format!("{}{}", request.host, request.path);
		let mut builder = match request.method {
			Method::Get => client.get(url),
			Method::Head => client.head(url),
			Method::Put => client.put(url),
			Method::Post => client.post(url),
			Method::Delete => client.delete(url),
		}
		.timeout(request.timeout);

		if let Some(user) = self.settings.username.as_deref() {
			builder = builder.basic_auth(user, self.settings.password.as_deref());
		}
		if let Some(body) = request.body.as_ref() {
			builder = builder.json(body);
		}

		let response = builder.send().await.map_err(|err| map_reqwest_error(&request, err))?;
		let status = response.status();
		let text = response.text().await.map_err(|err| map_reqwest_error(&request, err))?;

		Ok(HttpResponse { status: status.as_u16(), body: parse_body(status, &text) })
	}
}
impl Transport for ReqwestTransport {
	fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse>> {
		Box::pin(self.send_inner(request))
	}
}

fn map_reqwest_error(request: &HttpRequest, err: reqwest::Error) -> Error {
	if err.is_timeout() {
		return Error::Timeout {
			host: request.host.clone(),
			timeout_ms: request.timeout.as_millis() as u64,
		};
	}
	if err.is_decode() {
		return Error::InvalidResponse { message: err.to_string() };
	}

	Error::Unreachable { host: request.host.clone(), message: err.to_string() }
}

fn parse_body(status: StatusCode, text: &str) -> Value {
	if text.trim().is_empty() {
		return Value::Null;
	}

	serde_json::from_str(text).unwrap_or_else(|_| {
		tracing::debug!(status = status.as_u16(), "Response body is not JSON.");

		Value::String(text.to_string())
	})
}
