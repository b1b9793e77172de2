use std::{
	collections::{BTreeMap, HashMap},
	sync::{Mutex, MutexGuard},
	time::Duration,
};

use serde_json::{Value, json};

use watchlist_storage::{BoxFuture, HttpRequest, HttpResponse, Method, Transport};

use crate::query;

/// Failure injected for every request addressed to one host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
	Timeout,
	Unreachable,
	Status(u16),
	/// Answers after the delay, or times out when the delay exceeds the request timeout.
	Delay(Duration),
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub host: String,
	pub method: Method,
	pub path: String,
	pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct FakeIndex {
	mapping: Value,
	docs: BTreeMap<String, Value>,
}

#[derive(Debug)]
struct ClusterState {
	indices: BTreeMap<String, FakeIndex>,
	faults: HashMap<String, Fault>,
	requests: Vec<RecordedRequest>,
	color: String,
}

/// In-memory document store behind the [`Transport`] seam.
///
/// Every host shares one set of indices, so failover is observable only through the request log.
#[derive(Debug)]
pub struct FakeCluster {
	state: Mutex<ClusterState>,
}
impl FakeCluster {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(ClusterState {
				indices: BTreeMap::new(),
				faults: HashMap::new(),
				requests: Vec::new(),
				color: "green".to_string(),
			}),
		}
	}

	pub fn fail_host(&self, host: &str, fault: Fault) {
		self.lock().faults.insert(host.to_string(), fault);
	}

	pub fn heal_host(&self, host: &str) {
		self.lock().faults.remove(host);
	}

	pub fn set_color(&self, color: &str) {
		self.lock().color = color.to_string();
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.lock().requests.clone()
	}

	pub fn requests_to(&self, host: &str) -> usize {
		self.lock().requests.iter().filter(|request| request.host == host).count()
	}

	/// Requests whose path ends with `suffix`, such as `/_search`.
	pub fn requests_matching(&self, suffix: &str) -> Vec<RecordedRequest> {
		self.lock()
			.requests
			.iter()
			.filter(|request| request.path.ends_with(suffix))
			.cloned()
			.collect()
	}

	pub fn clear_requests(&self) {
		self.lock().requests.clear();
	}

	pub fn has_index(&self, index: &str) -> bool {
		self.lock().indices.contains_key(index)
	}

	/// Seeds a document directly, creating the index with an empty mapping when needed.
	pub fn put_document(&self, index: &str, id: &str, source: Value) {
		self.lock()
			.indices
			.entry(index.to_string())
			.or_default()
			.docs
			.insert(id.to_string(), source);
	}

	pub fn document_count(&self, index: &str) -> usize {
		self.lock().indices.get(index).map(|index| index.docs.len()).unwrap_or(0)
	}

	fn lock(&self) -> MutexGuard<'_, ClusterState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn handle(&self, method: Method, path: &str, body: Option<&Value>) -> HttpResponse {
		let mut state = self.lock();
		let path = path.split('?').next().unwrap_or_default();
		let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();

		match (method, segments.as_slice()) {
			(Method::Get, ["_cluster", "health"]) =>
				respond(200, json!({ "status": state.color, "number_of_nodes": 1 })),
			(Method::Get, ["_cluster", "health", index]) => match state.indices.contains_key(*index) {
				true => respond(200, json!({ "status": state.color, "index": index })),
				false => index_not_found(index),
			},
			(Method::Head, [index]) =>
				respond(if state.indices.contains_key(*index) { 200 } else { 404 }, Value::Null),
			(Method::Put, [index]) => {
				if state.indices.contains_key(*index) {
					return error_response(
						400,
						"resource_already_exists_exception",
						&format!("index [{index}] already exists"),
					);
				}

				let mapping = body.cloned().unwrap_or(Value::Null);

				state.indices.insert(index.to_string(), FakeIndex { mapping, docs: BTreeMap::new() });

				respond(200, json!({ "acknowledged": true, "index": index }))
			},
			(Method::Delete, [index]) => match state.indices.remove(*index) {
				Some(_) => respond(200, json!({ "acknowledged": true })),
				None => index_not_found(index),
			},
			(Method::Post, [index, "_refresh"]) => match state.indices.contains_key(*index) {
				true => respond(200, json!({ "_shards": { "failed": 0 } })),
				false => index_not_found(index),
			},
			(Method::Get | Method::Post, [index, "_count"]) => match state.indices.get(*index) {
				Some(found) => respond(200, json!({ "count": found.docs.len() })),
				None => index_not_found(index),
			},
			(Method::Put | Method::Post, [index, "_doc", id]) => {
				let source = body.cloned().unwrap_or_else(|| json!({}));

				state
					.indices
					.entry(index.to_string())
					.or_default()
					.docs
					.insert(id.to_string(), source);

				respond(201, json!({ "_index": index, "_id": id, "result": "created" }))
			},
			(Method::Get | Method::Post, [index, "_search"]) => {
				let Some(found) = state.indices.get(*index) else {
					return index_not_found(index);
				};
				let body = body.cloned().unwrap_or_else(|| json!({}));

				match query::search(&found.mapping, &found.docs, &body) {
					Ok(response) => respond(200, response),
					Err(reason) => error_response(400, "parsing_exception", &reason),
				}
			},
			_ => error_response(400, "unsupported_operation_exception", &format!("{method:?} {path}")),
		}
	}
}
impl Default for FakeCluster {
	fn default() -> Self {
		Self::new()
	}
}
impl Transport for FakeCluster {
	fn send<'a>(
		&'a self,
		request: HttpRequest,
	) -> BoxFuture<'a, watchlist_storage::Result<HttpResponse>> {
		Box::pin(async move {
			let fault = {
				let mut state = self.lock();

				state.requests.push(RecordedRequest {
					host: request.host.clone(),
					method: request.method,
					path: request.path.clone(),
					body: request.body.clone(),
				});

				state.faults.get(&request.host).copied()
			};
			let timed_out = || watchlist_storage::Error::Timeout {
				host: request.host.clone(),
				timeout_ms: request.timeout.as_millis() as u64,
			};

			match fault {
				Some(Fault::Timeout) => return Err(timed_out()),
				Some(Fault::Unreachable) =>
					return Err(watchlist_storage::Error::Unreachable {
						host: request.host.clone(),
						message: "Connection refused.".to_string(),
					}),
				Some(Fault::Status(status)) =>
					return Ok(error_response(status, "injected_fault", "Injected by the test.")),
				Some(Fault::Delay(delay)) => {
					if delay > request.timeout {
						tokio::time::sleep(request.timeout).await;

						return Err(timed_out());
					}

					tokio::time::sleep(delay).await;
				},
				None => {},
			}

			Ok(self.handle(request.method, &request.path, request.body.as_ref()))
		})
	}
}

fn respond(status: u16, body: Value) -> HttpResponse {
	HttpResponse { status, body }
}

fn error_response(status: u16, kind: &str, reason: &str) -> HttpResponse {
	respond(status, json!({ "error": { "type": kind, "reason": reason }, "status": status }))
}

fn index_not_found(index: &str) -> HttpResponse {
	error_response(404, "index_not_found_exception", &format!("no such index [{index}]"))
}
