mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Channel, Config, ContentField, ContentType, FieldKind, Memory, Normalizer, Postgres,
	Query, Security, Service, Storage, StorageBackend,
};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}

	match cfg.storage.backend {
		StorageBackend::Postgres => {
			let Some(postgres) = cfg.storage.postgres.as_ref() else {
				return Err(Error::Validation {
					message: "storage.postgres is required when storage.backend is postgres."
						.to_string(),
				});
			};

			if postgres.dsn.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.postgres.dsn must be non-empty.".to_string(),
				});
			}
			if postgres.pool_max_conns == 0 {
				return Err(Error::Validation {
					message: "storage.postgres.pool_max_conns must be greater than zero."
						.to_string(),
				});
			}
		},
		StorageBackend::Memory => {},
	}

	if cfg.channel.name.trim().is_empty() {
		return Err(Error::Validation { message: "channel.name must be non-empty.".to_string() });
	}
	if cfg.channel.default_language.trim().is_empty() {
		return Err(Error::Validation {
			message: "channel.default_language must be non-empty.".to_string(),
		});
	}
	if !cfg.channel.root_path.starts_with('/') {
		return Err(Error::Validation {
			message: "channel.root_path must start with '/'.".to_string(),
		});
	}
	if cfg.query.deadline_ms == 0 {
		return Err(Error::Validation {
			message: "query.deadline_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.enabled {
		if cfg.cache.ttl_secs == 0 {
			return Err(Error::Validation {
				message: "cache.ttl_secs must be greater than zero when the cache is enabled."
					.to_string(),
			});
		}
		if cfg.cache.max_entries == 0 {
			return Err(Error::Validation {
				message: "cache.max_entries must be greater than zero when the cache is enabled."
					.to_string(),
			});
		}
	}
	if cfg.security.enforce_api_key && cfg.security.api_key.is_none() {
		return Err(Error::Validation {
			message: "security.api_key must be set when security.enforce_api_key is true."
				.to_string(),
		});
	}

	let mut seen = HashSet::new();

	for content_type in &cfg.content_types {
		if content_type.name.trim().is_empty() {
			return Err(Error::Validation {
				message: "content_types.name must be non-empty.".to_string(),
			});
		}
		if !seen.insert(content_type.name.to_ascii_lowercase()) {
			return Err(Error::DuplicateContentType { name: content_type.name.clone() });
		}

		let mut field_names = HashSet::new();

		for field in &content_type.fields {
			if field.name.trim().is_empty() {
				return Err(Error::Validation {
					message: format!(
						"content_types.{}.fields.name must be non-empty.",
						content_type.name
					),
				});
			}
			if !field_names.insert(field.name.as_str()) {
				return Err(Error::Validation {
					message: format!(
						"content_types.{}.fields declares {:?} more than once.",
						content_type.name, field.name
					),
				});
			}
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.security.api_key = None;
	}
	if cfg
		.storage
		.memory
		.seed_path
		.as_deref()
		.map(|path| path.as_os_str().is_empty())
		.unwrap_or(false)
	{
		cfg.storage.memory.seed_path = None;
	}

	let root = cfg.channel.root_path.trim().trim_end_matches('/');

	cfg.channel.root_path = if root.is_empty() { "/".to_string() } else { root.to_string() };
	cfg.channel.default_language = cfg.channel.default_language.trim().to_string();
}
