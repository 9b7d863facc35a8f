//! Read API over the scraped delegations.
//!
//! - `GET /xtz/delegations` - newest first, optional `year` filter,
//!   `page`/`per_page` pagination with a `Link` header

mod criteria;
mod error;
mod finder;
mod handler;
mod models;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use log::{error, info};

pub use criteria::{
    BindError, DelegationsCriteria, DelegationsPage, DEFAULT_PAGE, DEFAULT_PER_PAGE,
    MAX_PER_PAGE, MAX_YEARS_IN_FUTURE, MIN_YEAR,
};
pub use error::ApiError;
pub use finder::DelegationsFinder;
pub use handler::{build_pagination_links, get_delegations};
pub use models::{DelegationDto, DelegationsResponse};

#[derive(Clone)]
pub struct AppState {
    pub finder: Arc<dyn DelegationsFinder>,
}

impl AppState {
    pub fn new(finder: Arc<dyn DelegationsFinder>) -> Self {
        Self { finder }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/xtz/delegations", get(get_delegations))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Log method, URI, status and latency of every request; server errors at
/// error level.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed = started.elapsed();
    if status.is_server_error() {
        error!("{} {} -> {} in {:?}", method, uri, status, elapsed);
    } else {
        info!("{} {} -> {} in {:?}", method, uri, status, elapsed);
    }

    response
}
