use std::collections::{BTreeMap, HashMap};

use axum::extract::State;
use axum::http::{header, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Datelike, Utc};

use crate::web::{ApiError, AppState, DelegationsCriteria, DelegationsPage, DelegationsResponse};

/// Query parameters by key, sorted, keeping repeated values in order.
type QueryParams = BTreeMap<String, Vec<String>>;

/// `GET /xtz/delegations?year=YYYY&page=N&per_page=M`
pub async fn get_delegations(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Response, ApiError> {
    let params = parse_query(uri.query().unwrap_or_default());
    let criteria = DelegationsCriteria::bind(&first_values(&params), Utc::now().year())?;

    let page = state
        .finder
        .find_delegations(&criteria)
        .await
        .map_err(|e| ApiError::Internal(e.context("Failed to query delegations")))?;

    let mut response = Json(DelegationsResponse::new(&page.delegations)).into_response();
    if let Some(links) = build_pagination_links(&page, uri.path(), &params) {
        if let Ok(value) = HeaderValue::from_str(&links) {
            response.headers_mut().insert(header::LINK, value);
        }
    }

    Ok(response)
}

fn parse_query(raw: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

/// First value of each parameter, the one binding looks at.
fn first_values(params: &QueryParams) -> HashMap<String, String> {
    params
        .iter()
        .filter_map(|(key, values)| Some((key.clone(), values.first()?.clone())))
        .collect()
}

/// `Link` header value with `prev`/`next` relations, or `None` on a lone
/// page. Other query parameters (such as `year`) are carried over.
pub fn build_pagination_links(
    page: &DelegationsPage,
    path: &str,
    params: &QueryParams,
) -> Option<String> {
    let mut links = Vec::new();

    if page.has_previous() {
        let url = page_url(path, params, page.page - 1, page.per_page);
        links.push(format!("<{}>; rel=\"prev\"", url));
    }
    if page.has_next() {
        let url = page_url(path, params, page.page + 1, page.per_page);
        links.push(format!("<{}>; rel=\"next\"", url));
    }

    (!links.is_empty()).then(|| links.join(", "))
}

fn page_url(path: &str, params: &QueryParams, page: u64, per_page: u64) -> String {
    let mut params = params.clone();
    params.insert("page".to_string(), vec![page.to_string()]);
    params.insert("per_page".to_string(), vec![per_page.to_string()]);

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, values) in &params {
        for value in values {
            query.append_pair(key, value);
        }
    }

    format!("{}?{}", path, query.finish())
}
