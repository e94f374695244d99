use std::sync::Arc;

use dynq_service::DynqService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<DynqService>,
	/// Required `X-API-Key` value, `None` when the guard is off.
	pub api_key: Option<Arc<str>>,
}
impl AppState {
	pub async fn new(config: dynq_config::Config) -> color_eyre::Result<Self> {
		let service = DynqService::new(config).await?;

		tracing::info!(
			channel = %service.channel.name,
			content_types = service.normalizer().registry().len(),
			"Dynamic content service ready."
		);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: DynqService) -> Self {
		let security = &service.cfg.security;
		let api_key = if security.enforce_api_key {
			security.api_key.as_deref().map(Arc::from)
		} else {
			None
		};

		Self { service: Arc::new(service), api_key }
	}
}
