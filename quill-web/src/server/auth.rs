use crate::server::{Result, ServerError};
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, request::Parts},
};
use headers::{Authorization, Cookie, HeaderMapExt, authorization::Bearer};
use quill_common::{
    model::{
        Id,
        auth::{Authentication, SessionToken},
        user::{User, UserMarker},
    },
    util::PositiveDuration,
};
use quill_db::client::DbClient;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info};

pub const SESSION_COOKIE: &str = "quill_session";

/// The user behind a valid session. Extracting it on a request without one
/// sends the client to the login page.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = headers.typed_get::<Cookie>()
        && let Some(token) = cookie.get(SESSION_COOKIE)
    {
        return Some(token.to_owned());
    }

    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|authorization| authorization.token().to_owned())
}

async fn resolve_session(parts: &Parts, db: &DbClient) -> Result<Option<User>> {
    let Some(raw_token) = session_token(&parts.headers) else {
        return Ok(None);
    };

    let request_token: SessionToken = match raw_token.parse() {
        Ok(token) => token,
        Err(error) => {
            debug!(%error, "Ignoring malformed session token");
            return Ok(None);
        }
    };
    let token_hash = request_token.hash()?;

    let Some(authentication) = db.fetch_authentication(&token_hash).await? else {
        debug!(user = %request_token.user_id, "Unknown session token");
        return Ok(None);
    };

    if authentication.user != request_token.user_id
        || authentication.is_expired_at(UtcDateTime::now())
    {
        debug!(user = %authentication.user, "Rejecting stale session");
        return Ok(None);
    }

    Ok(db.fetch_user(authentication.user).await?)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db = Arc::<DbClient>::from_ref(state);

        match resolve_session(parts, &db).await? {
            Some(user) => Ok(Self { user }),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string);
                Err(ServerError::LoginRequired { next })
            }
        }
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let db = Arc::<DbClient>::from_ref(state);

        Ok(resolve_session(parts, &db)
            .await?
            .map(|user| Self { user }))
    }
}

/// Persists a fresh session for `user` and returns the token to hand out.
pub async fn start_session(
    db: &DbClient,
    user: Id<UserMarker>,
    expires_after: Option<PositiveDuration>,
) -> Result<SessionToken> {
    let token = SessionToken::generate_random(user);
    let authentication = Authentication {
        user,
        token_hash: token.hash()?,
        created_at: UtcDateTime::now(),
        expires_after,
    };
    db.create_authentication(&authentication).await?;

    info!(%user, "Started session");
    Ok(token)
}

/// Deletes the session the request carries, if any.
pub async fn end_session(headers: &HeaderMap, db: &DbClient) -> Result<()> {
    let Some(token) = session_token(headers).and_then(|raw| raw.parse::<SessionToken>().ok()) else {
        return Ok(());
    };

    let removed = db.delete_authentication(&token.hash()?).await?;
    info!(user = %token.user_id, removed, "Ended session");
    Ok(())
}

#[must_use]
pub fn session_cookie(token: &SessionToken, max_age: Option<PositiveDuration>) -> String {
    let token = token.as_token_str();
    match max_age {
        Some(max_age) => format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            max_age.whole_seconds()
        ),
        None => format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"),
    }
}

#[must_use]
pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use crate::server::{
        auth::{expired_session_cookie, session_cookie},
        test_util::{TestApp, body_string},
    };
    use axum::http::{Request, StatusCode, header};
    use quill_common::{model::auth::SessionToken, util::PositiveDuration};

    #[test]
    fn cookie_attributes() {
        let token = SessionToken::generate_random(7_u64.into());
        let cookie = session_cookie(&token, PositiveDuration::from_seconds(60));

        assert!(cookie.starts_with(&format!("quill_session={}", token.as_token_str())));
        assert!(cookie.ends_with("Max-Age=60"));
        assert!(expired_session_cookie().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn bearer_tokens_authenticate_like_cookies() {
        let app = TestApp::new();
        let (_, cookie) = app.user("leo").await;
        let token = cookie.trim_start_matches("quill_session=").to_owned();

        let request = Request::get("/follow/")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.request(request).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forged_tokens_count_as_guests() {
        let app = TestApp::new();
        let (_, cookie) = app.user("leo").await;
        let forged = cookie.replacen("quill_session=", "quill_session=9", 1);

        for cookie in [forged.as_str(), "quill_session=garbage"] {
            let response = app.get("/follow/", Some(cookie)).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
        }

        let page = body_string(app.get("/about/tech/", Some("quill_session=garbage")).await).await;
        assert!(page.contains("Log in"));
    }
}
