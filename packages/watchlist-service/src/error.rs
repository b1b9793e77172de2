pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Search backend unavailable: {message}")]
	Unavailable { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Whether the failure means the backing tier could not be reached.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Self::Unavailable { .. })
	}
}

impl From<watchlist_storage::Error> for Error {
	fn from(err: watchlist_storage::Error) -> Self {
		if err.is_connectivity() {
			Self::Unavailable { message: err.to_string() }
		} else if err.is_client_error() {
			Self::InvalidRequest { message: err.to_string() }
		} else {
			Self::Storage { message: err.to_string() }
		}
	}
}

impl From<watchlist_providers::Error> for Error {
	fn from(err: watchlist_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
