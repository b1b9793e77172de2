use std::{env, fs, path::Path};

pub const HOST_ENV_VARS: [&str; 3] = ["WATCHLIST_ES_HOSTS", "ELASTICSEARCH_HOSTS", "ES_HOSTS"];
pub const CONTAINER_HOST: &str = "http://elasticsearch:9200";
pub const FALLBACK_HOST: &str = "http://localhost:9200";

/// Where the process runs, as far as host resolution cares.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentContext {
	pub containerized: bool,
	pub hostname: Option<String>,
}
impl DeploymentContext {
	pub fn detect() -> Self {
		let containerized = Path::new("/.dockerenv").exists()
			|| env::var_os("KUBERNETES_SERVICE_HOST").is_some();
		let hostname = env::var("HOSTNAME")
			.ok()
			.or_else(|| fs::read_to_string("/etc/hostname").ok())
			.map(|raw| raw.trim().to_string())
			.filter(|raw| !raw.is_empty());

		Self { containerized, hostname }
	}
}

/// Picks the host list: explicit, then environment, then deployment context, then localhost.
///
/// The result is normalized and free of duplicates, preserving first occurrence.
pub fn resolve_hosts<F>(
	cfg: &watchlist_config::Storage,
	lookup: F,
	context: &DeploymentContext,
) -> Vec<String>
where
	F: Fn(&str) -> Option<String>,
{
	let raw = if !cfg.hosts.is_empty() {
		cfg.hosts.clone()
	} else if let Some(from_env) = HOST_ENV_VARS
		.iter()
		.filter_map(|name| lookup(name))
		.map(|value| watchlist_config::split_list(&value))
		.find(|hosts| !hosts.is_empty())
	{
		from_env
	} else if context.containerized {
		vec![CONTAINER_HOST.to_string()]
	} else if let Some(hostname) = context.hostname.as_deref()
		&& cfg.production_hostnames.iter().any(|known| known.eq_ignore_ascii_case(hostname))
		&& !cfg.production_hosts.is_empty()
	{
		cfg.production_hosts.clone()
	} else {
		vec![FALLBACK_HOST.to_string()]
	};
	let mut out: Vec<String> = Vec::with_capacity(raw.len());

	for host in raw {
		let normalized = normalize_host(&host, cfg.use_tls);

		if !normalized.is_empty() && !out.contains(&normalized) {
			out.push(normalized);
		}
	}

	out
}

/// Ensures an explicit scheme and strips trailing slashes.
pub fn normalize_host(raw: &str, use_tls: bool) -> String {
	let trimmed = raw.trim().trim_end_matches('/');

	if trimmed.is_empty() {
		return String::new();
	}
	if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
		return trimmed.to_string();
	}

	let scheme = if use_tls { "https" } else { "http" };

	format!("{scheme}://{trimmed}")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn storage(hosts: &[&str]) -> watchlist_config::Storage {
		watchlist_config::Storage {
			hosts: hosts.iter().map(|host| host.to_string()).collect(),
			..Default::default()
		}
	}

	fn no_env(_: &str) -> Option<String> {
		None
	}

	#[test]
	fn explicit_hosts_win() {
		let hosts = resolve_hosts(
			&storage(&["es1:9200/"]),
			|_| Some("env:9200".to_string()),
			&DeploymentContext { containerized: true, hostname: None },
		);

		assert_eq!(hosts, vec!["http://es1:9200"]);
	}

	#[test]
	fn environment_beats_context() {
		let hosts = resolve_hosts(
			&storage(&[]),
			|name| (name == "ES_HOSTS").then(|| "a:9200,b:9200".to_string()),
			&DeploymentContext { containerized: true, hostname: None },
		);

		assert_eq!(hosts, vec!["http://a:9200", "http://b:9200"]);
	}

	#[test]
	fn container_context_uses_service_name() {
		let hosts = resolve_hosts(
			&storage(&[]),
			no_env,
			&DeploymentContext { containerized: true, hostname: None },
		);

		assert_eq!(hosts, vec![CONTAINER_HOST]);
	}

	#[test]
	fn known_production_hostname_uses_production_hosts() {
		let cfg = watchlist_config::Storage {
			production_hostnames: vec!["screen-prod-01".to_string()],
			production_hosts: vec!["10.0.0.5:9200".to_string()],
			use_tls: true,
			..Default::default()
		};
		let context =
			DeploymentContext { containerized: false, hostname: Some("SCREEN-PROD-01".to_string()) };
		let hosts = resolve_hosts(&cfg, no_env, &context);

		assert_eq!(hosts, vec!["https://10.0.0.5:9200"]);
	}

	#[test]
	fn falls_back_to_localhost() {
		let hosts = resolve_hosts(&storage(&[]), no_env, &DeploymentContext::default());

		assert_eq!(hosts, vec![FALLBACK_HOST]);
	}

	#[test]
	fn duplicates_are_removed_in_order() {
		let hosts = resolve_hosts(
			&storage(&["b:1", "http://a:1", "b:1/"]),
			no_env,
			&DeploymentContext::default(),
		);

		assert_eq!(hosts, vec!["http://b:1", "http://a:1"]);
	}

	#[test]
	fn tls_picks_https_scheme() {
		assert_eq!(normalize_host("es:9200", true), "https://es:9200");
		assert_eq!(normalize_host("http://es:9200//", true), "http://es:9200");
	}
}
