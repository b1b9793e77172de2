use serde::Serialize;
use serde_json::Value;

use crate::{DocumentStore, Error, IndexKind, Method, OpCategory, Result, schema};

#[derive(Clone, Debug, Serialize)]
pub struct IndexHealth {
	pub kind: IndexKind,
	pub name: String,
	pub exists: bool,
	pub doc_count: Option<u64>,
	/// Index color from cluster health, when the index exists.
	pub status: Option<String>,
}

impl DocumentStore {
	pub async fn index_exists(&self, index: &str) -> Result<bool> {
		let response =
			self.request(OpCategory::Index, Method::Head, &format!("/{index}"), None).await?;

		match response.status {
			200..=299 => Ok(true),
			404 => Ok(false),
			status => Err(Error::Status { status, message: response.error_reason() }),
		}
	}

	/// Creates the index for `kind` with its rendered mapping.
	///
	/// Returns `false` when the index already existed. Safe to call repeatedly and concurrently.
	pub async fn create_index(&self, kind: IndexKind) -> Result<bool> {
		let name = kind.index_name(self.storage_config()).to_string();
		let creation_error =
			|message: String| Error::IndexCreation { index: name.clone(), message };

		if self.index_exists(&name).await.map_err(|err| creation_error(err.to_string()))? {
			tracing::debug!(index = %name, "Index already exists.");

			return Ok(false);
		}

		let mapping = schema::render_mapping(kind, self.storage_config())?;
		let response = self
			.request(OpCategory::Index, Method::Put, &format!("/{name}"), Some(mapping))
			.await
			.map_err(|err| creation_error(err.to_string()))?;

		if response.is_success() {
			tracing::info!(index = %name, kind = kind.as_str(), "Created index.");

			return Ok(true);
		}
		if response.body.pointer("/error/type").and_then(Value::as_str)
			== Some("resource_already_exists_exception")
		{
			return Ok(false);
		}

		Err(creation_error(response.error_reason()))
	}

	/// Creates every index kind, reporting which ones were new.
	pub async fn create_all_indices(&self) -> Result<Vec<(IndexKind, bool)>> {
		let mut out = Vec::with_capacity(IndexKind::ALL.len());

		for kind in IndexKind::ALL {
			out.push((kind, self.create_index(kind).await?));
		}

		Ok(out)
	}

	/// Deletes `index`. Returns `false` when it did not exist.
	pub async fn delete_index(&self, index: &str) -> Result<bool> {
		let response =
			self.request(OpCategory::Index, Method::Delete, &format!("/{index}"), None).await?;

		match response.status {
			200..=299 => Ok(true),
			404 => Ok(false),
			status => Err(Error::Status { status, message: response.error_reason() }),
		}
	}

	pub async fn refresh_index(&self, index: &str) -> Result<()> {
		let response = self
			.request(OpCategory::Index, Method::Post, &format!("/{index}/_refresh"), None)
			.await?;

		ensure_success(&response)
	}

	pub async fn count(&self, index: &str) -> Result<u64> {
		let response =
			self.request(OpCategory::Search, Method::Get, &format!("/{index}/_count"), None).await?;

		ensure_success(&response)?;

		response.body.get("count").and_then(Value::as_u64).ok_or_else(|| Error::InvalidResponse {
			message: format!("Count response for {index} has no count."),
		})
	}

	/// Writes one source document under `id`.
	pub async fn index_document(&self, index: &str, id: &str, source: Value) -> Result<()> {
		let response = self
			.request(OpCategory::Index, Method::Put, &format!("/{index}/_doc/{id}"), Some(source))
			.await?;

		ensure_success(&response)
	}

	/// Existence, document count and color of every configured index.
	pub async fn index_health(&self) -> Result<Vec<IndexHealth>> {
		let mut out = Vec::with_capacity(IndexKind::ALL.len());

		for kind in IndexKind::ALL {
			let name = kind.index_name(self.storage_config()).to_string();

			if !self.index_exists(&name).await? {
				out.push(IndexHealth { kind, name, exists: false, doc_count: None, status: None });

				continue;
			}

			let doc_count = self.count(&name).await?;
			let response = self
				.request(
					OpCategory::Health,
					Method::Get,
					&format!("/_cluster/health/{name}"),
					None,
				)
				.await?;
			let status = response.body.get("status").and_then(Value::as_str).map(str::to_string);

			out.push(IndexHealth { kind, name, exists: true, doc_count: Some(doc_count), status });
		}

		Ok(out)
	}
}

fn ensure_success(response: &crate::HttpResponse) -> Result<()> {
	if response.is_success() {
		Ok(())
	} else {
		Err(Error::Status { status: response.status, message: response.error_reason() })
	}
}
