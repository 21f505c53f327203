use crate::server::{ServerError, ServerRouter};
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use quill_common::pagination::parse_page_number;

pub mod about;
pub mod auth;
pub mod posts;
pub mod users;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(users::routes())
        .merge(auth::routes())
        .merge(about::routes())
}

/// The `page` query parameter. Missing or malformed values mean the first
/// page; the last occurrence wins when it is repeated.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct RequestedPage(pub i64);

impl<S> FromRequestParts<S> for RequestedPage
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)?;
        let raw = pairs
            .iter()
            .rev()
            .find(|(key, _)| key == "page")
            .map(|(_, value)| value.as_str());

        Ok(Self(parse_page_number(raw)))
    }
}
