#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Host {host} is unreachable: {message}")]
	Unreachable { host: String, message: String },
	#[error("Request to {host} timed out after {timeout_ms}ms.")]
	Timeout { host: String, timeout_ms: u64 },
	#[error("Document store returned status {status}: {message}")]
	Status { status: u16, message: String },
	#[error("No healthy hosts are available.")]
	NoHealthyHosts,
	#[error("Gave up after {attempts} attempts: {last}")]
	RetriesExhausted { attempts: u32, last: Box<Error> },
	#[error("Failed to create index {index}: {message}")]
	IndexCreation { index: String, message: String },
	#[error("Invalid response: {message}")]
	InvalidResponse { message: String },
	#[error("Invalid configuration: {message}")]
	InvalidConfig { message: String },
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
impl Error {
	/// Failures worth another attempt on a different host.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Unreachable { .. } | Self::Timeout { .. } => true,
			Self::Status { status, .. } => *status >= 500,
			_ => false,
		}
	}

	/// True when the store could not be reached at all, as opposed to rejecting a request.
	pub fn is_connectivity(&self) -> bool {
		match self {
			Self::Unreachable { .. } | Self::Timeout { .. } | Self::NoHealthyHosts => true,
			Self::Status { status, .. } => *status >= 500,
			Self::RetriesExhausted { last, .. } => last.is_connectivity(),
			_ => false,
		}
	}

	pub fn is_client_error(&self) -> bool {
		matches!(self, Self::Status { status, .. } if (400..500).contains(status))
	}
}
