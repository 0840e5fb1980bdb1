use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{
        HeaderMap, HeaderValue, Uri,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::application::{
    gallery::GalleryService, repos::PostListFilter, theme::ThemeService, views::ViewCounter,
    visitor::VisitorIdentity,
};
use crate::cache::ThemeFragment;
use crate::domain::types::PostType;

use super::{
    StoreChecks, db_health_response,
    error::ApiError,
    middleware::{ViewThrottle, is_secure_request, log_responses, set_request_context, throttle_views},
};

/// Largest page a listing request may ask for.
pub const MAX_LIST_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct HttpState {
    pub gallery: GalleryService,
    pub themes: ThemeService,
    pub views: ViewCounter,
    pub visitors: VisitorIdentity,
    pub checks: StoreChecks,
    /// Honour `X-Forwarded-Proto` when deciding on `Secure` cookies.
    pub trust_forwarded_headers: bool,
}

pub fn build_router(state: HttpState, throttle: ViewThrottle) -> Router {
    let view_routes = Router::new()
        .route("/api/posts/{id}/views", post(record_single_view))
        .route("/api/groups/{id}/views", post(record_group_view))
        .route_layer(middleware::from_fn_with_state(throttle, throttle_views));

    Router::new()
        .route("/api/posts", get(list_posts))
        .route("/api/posts/{id}", get(single_post))
        .route("/api/groups/{id}", get(group_post))
        .route("/fragments/{name}", get(theme_fragment))
        .route("/_health/db", get(public_health))
        .merge(view_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListQuery {
    tag: Option<String>,
    #[serde(rename = "type")]
    post_type: Option<String>,
    offset: Option<u32>,
    limit: Option<u32>,
}

impl ListQuery {
    fn into_filter(self, page_size: u32) -> Result<PostListFilter, ApiError> {
        const SOURCE: &str = "infra::http::public::list_posts";

        let post_type = match self.post_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<PostType>().map_err(|err| {
                ApiError::bad_request(SOURCE, "Unknown post type", Some(err.to_string()))
            })?),
        };

        let limit = self.limit.unwrap_or(page_size);
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(ApiError::bad_request(
                SOURCE,
                "Invalid limit",
                Some(format!("limit must be between 1 and {MAX_LIST_LIMIT}")),
            ));
        }

        let tag = self
            .tag
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty());

        Ok(PostListFilter {
            tag,
            post_type,
            offset: self.offset.unwrap_or(0),
            limit,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewRecorded {
    pub incremented: bool,
}

async fn list_posts(State(state): State<HttpState>, Query(query): Query<ListQuery>) -> Response {
    let filter = match query.into_filter(state.gallery.page_size()) {
        Ok(filter) => filter,
        Err(err) => return err.into_response(),
    };

    match state.gallery.list(&filter).await {
        Ok(listing) => Json(listing).into_response(),
        Err(err) => ApiError::from(("infra::http::public::list_posts", err)).into_response(),
    }
}

async fn single_post(State(state): State<HttpState>, Path(id): Path<i64>) -> Response {
    const SOURCE: &str = "infra::http::public::single_post";
    match state.gallery.single(id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => ApiError::not_found(SOURCE, "Post not found").into_response(),
        Err(err) => ApiError::from((SOURCE, err)).into_response(),
    }
}

async fn group_post(State(state): State<HttpState>, Path(id): Path<i64>) -> Response {
    const SOURCE: &str = "infra::http::public::group_post";
    match state.gallery.group(id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => ApiError::not_found(SOURCE, "Group not found").into_response(),
        Err(err) => ApiError::from((SOURCE, err)).into_response(),
    }
}

async fn record_single_view(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
) -> Response {
    record_view(&state, PostType::Single, id, &headers, &uri, jar).await
}

async fn record_group_view(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
) -> Response {
    record_view(&state, PostType::Group, id, &headers, &uri, jar).await
}

/// Counter failures still answer 200 with `incremented: false`.
async fn record_view(
    state: &HttpState,
    post_type: PostType,
    id: i64,
    headers: &HeaderMap,
    uri: &Uri,
    jar: CookieJar,
) -> Response {
    let secure = is_secure_request(headers, uri.scheme_str(), state.trust_forwarded_headers);
    let (jar, visitor) = state.visitors.get_or_create(jar, secure);

    let incremented = state
        .views
        .increment(id, post_type, &visitor, state.views.dedup_window())
        .await
        .unwrap_or(false);

    (jar, Json(ViewRecorded { incremented })).into_response()
}

async fn theme_fragment(State(state): State<HttpState>, Path(name): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::theme_fragment";
    let Some(fragment) = ThemeFragment::parse(&name) else {
        return ApiError::not_found(SOURCE, "Unknown fragment").into_response();
    };

    match state.themes.fragment(fragment).await {
        Ok(Some(html)) => {
            let mut response = html.into_response();
            let headers = response.headers_mut();
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Ok(None) => ApiError::not_found(SOURCE, "Theme not configured").into_response(),
        Err(err) => ApiError::from_repo(SOURCE, err).into_response(),
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.checks.check().await)
}
