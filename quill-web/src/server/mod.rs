use crate::config::Config;
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};
use cache::PageCache;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use quill_common::model::{
    Id,
    auth::{PasswordHashError, SessionTokenHashError},
    post::PostMarker,
};
use quill_db::client::{DbClient, DbError};
use std::sync::Arc;
use thiserror::Error;
use tower_http::services::ServeDir;
use tracing::{debug, error};

pub mod auth;
pub mod cache;
mod form;
mod media;
mod routes;
mod templates;
#[cfg(test)]
mod test_util;

pub type ServerRouter = Router<ServerState>;

/// Uploads bigger than this are rejected before the handler runs.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Characters of a `next` path that stay readable in the login redirect.
pub(crate) const NEXT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub page_cache: PageCache,
    pub config: Arc<Config>,
}

impl ServerState {
    #[must_use]
    pub fn new(db_client: DbClient, config: Config) -> Self {
        Self {
            db_client: Arc::new(db_client),
            page_cache: PageCache::new(config.index_cache_ttl()),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: ServerState) -> Router {
    let media = ServeDir::new(&state.config.media_root);

    routes::routes()
        .nest_service("/media", media)
        .fallback(fallback)
        .layer(middleware::from_fn(not_found_page))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

/// Every 404 gets the same page naming the requested path, whether it came
/// from a handler, a rejected path parameter or the media directory.
async fn not_found_page(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let response = next.run(request).await;

    if response.status() == StatusCode::NOT_FOUND {
        (StatusCode::NOT_FOUND, templates::not_found(&path)).into_response()
    } else {
        response
    }
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Form rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading a multipart field failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Login required for {next}")]
    LoginRequired { next: String },
    #[error("The session token could not be hashed: {0}")]
    SessionTokenHash(#[from] SessionTokenHashError),
    #[error("The password could not be hashed: {0}")]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Storing an uploaded image failed: {0}")]
    Media(std::io::Error),
    #[error("User {0} was not found.")]
    UserNotFound(String),
    #[error("Group {0} was not found.")]
    GroupNotFound(String),
    #[error("Post {post_id} by {username} was not found.")]
    PostNotFound {
        username: String,
        post_id: Id<PostMarker>,
    },
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::UserNotFound(_)
            | ServerError::GroupNotFound(_)
            | ServerError::PostNotFound { .. } => StatusCode::NOT_FOUND,
            ServerError::LoginRequired { .. } => StatusCode::SEE_OTHER,
            ServerError::QueryRejection(_)
            | ServerError::FormRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::SessionTokenHash(_)
            | ServerError::PasswordHash(_)
            | ServerError::Database(_)
            | ServerError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Where a guest is sent when they need to log in first.
#[must_use]
pub fn login_redirect_target(next: &str) -> String {
    format!("/auth/login/?next={}", utf8_percent_encode(next, NEXT_SET))
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ServerError::LoginRequired { next } = &self {
            debug!(%next, "Redirecting guest to login");
            return Redirect::to(&login_redirect_target(next)).into_response();
        }

        error!(error = %self, %status, "Replying with error");

        let page = match status {
            StatusCode::NOT_FOUND => templates::not_found(""),
            StatusCode::BAD_REQUEST => templates::bad_request(),
            _ => templates::server_error(),
        };
        (status, page).into_response()
    }
}
