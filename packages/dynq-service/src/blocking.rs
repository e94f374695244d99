use tokio::runtime::{Builder, Handle, RuntimeFlavor};

use dynq_domain::QueryRequest;

use crate::{DynqService, Error, NormalizedItem, Result};

impl DynqService {
	/// Synchronous entry point for legacy callers.
	///
	/// Always queries every descendant of `path`. Callable outside a runtime or from a
	/// multi-thread runtime. A current-thread runtime cannot drive the engine while its only
	/// thread blocks, so such calls log an error and return an empty list.
	pub fn query_dynamic_content_blocking(
		&self,
		content_type: Option<&str>,
		path: &str,
		limit: u32,
		offset: u32,
		order_by: Option<&str>,
		direction: Option<&str>,
	) -> Vec<NormalizedItem> {
		let request = legacy_request(content_type, path, limit, offset, order_by, direction);

		match self.block_on_query(request) {
			Ok(items) => items,
			Err(err) => {
				tracing::error!(
					error = %err,
					"Blocking content query failed; returning an empty result."
				);

				Vec::new()
			},
		}
	}

	fn block_on_query(&self, request: QueryRequest) -> Result<Vec<NormalizedItem>> {
		match Handle::try_current() {
			Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread =>
				Ok(tokio::task::block_in_place(|| {
					handle.block_on(self.query_dynamic_content(request))
				})),
			Ok(_) => Err(Error::Runtime {
				message: "Blocking queries cannot run on a current-thread runtime.".to_string(),
			}),
			Err(_) => self.run_on_fresh_runtime(request),
		}
	}

	fn run_on_fresh_runtime(&self, request: QueryRequest) -> Result<Vec<NormalizedItem>> {
		let runtime = Builder::new_current_thread().enable_all().build().map_err(|err| {
			Error::Runtime { message: format!("Failed to build a query runtime: {err}.") }
		})?;

		Ok(runtime.block_on(self.query_dynamic_content(request)))
	}
}

/// Maps the legacy positional arguments onto a subtree request.
pub fn legacy_request(
	content_type: Option<&str>,
	path: &str,
	limit: u32,
	offset: u32,
	order_by: Option<&str>,
	direction: Option<&str>,
) -> QueryRequest {
	let order_by = order_by.map(str::trim).filter(|field| !field.is_empty()).map(|field| {
		match direction.map(str::trim).filter(|direction| !direction.is_empty()) {
			Some(direction) => format!("{field} {direction}"),
			None => field.to_string(),
		}
	});

	QueryRequest {
		path: path.to_string(),
		content_type: content_type.map(str::to_string),
		order_by,
		skip: offset,
		take: limit,
		only_this_page: false,
		nesting_level: 0,
		..Default::default()
	}
}
