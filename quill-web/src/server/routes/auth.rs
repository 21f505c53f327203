use crate::{
    config::Config,
    server::{
        Result, ServerError, ServerRouter,
        auth::{self, AuthenticatedUser},
        form::{Form, Query},
        routes::posts::IndexPath,
        templates,
    },
};
use axum::{
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use maud::Markup;
use quill_common::{
    form::{FormErrors, INVALID_LOGIN, LoginForm, NON_FIELD_ERRORS, SignupForm, USERNAME_TAKEN},
    model::{
        auth::{hash_password, verify_password},
        user::CreateUser,
    },
};
use quill_db::client::{DbClient, DbError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(signup_form)
        .typed_post(signup)
        .typed_get(login_form)
        .typed_post(login)
        .typed_get(logout)
        .typed_post(logout)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup/", rejection(ServerError))]
pub struct SignupPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login/", rejection(ServerError))]
pub struct LoginPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/logout/", rejection(ServerError))]
pub struct LogoutPath();

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

/// Only local absolute paths are followed after login.
fn redirect_target(next: Option<&str>) -> String {
    match next {
        Some(next) if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') => {
            next.to_owned()
        }
        _ => IndexPath().to_string(),
    }
}

async fn signup_form(
    SignupPath(): SignupPath,
    viewer: Option<AuthenticatedUser>,
) -> Markup {
    templates::auth::signup(
        viewer.as_ref().map(AuthenticatedUser::user),
        &SignupForm::default(),
        &FormErrors::new(),
    )
}

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    let values = SignupForm {
        password1: String::new(),
        password2: String::new(),
        ..form.clone()
    };
    let rejected = |errors: &FormErrors| templates::auth::signup(None, &values, errors).into_response();

    let cleaned = match form.clean() {
        Ok(cleaned) => cleaned,
        Err(errors) => return Ok(rejected(&errors)),
    };

    let mut errors = FormErrors::new();
    if db
        .fetch_user_by_username(cleaned.username.get())
        .await?
        .is_some()
    {
        errors.add("username", USERNAME_TAKEN);
        return Ok(rejected(&errors));
    }

    let user = CreateUser {
        username: cleaned.username,
        first_name: cleaned.first_name,
        last_name: cleaned.last_name,
        password_hash: hash_password(&cleaned.password)?,
    };
    match db.create_user(&user).await {
        Ok(_) => Ok(Redirect::to(&LoginPath().to_string()).into_response()),
        Err(DbError::UniqueViolation) => {
            errors.add("username", USERNAME_TAKEN);
            Ok(rejected(&errors))
        }
        Err(error) => Err(error.into()),
    }
}

async fn login_form(
    LoginPath(): LoginPath,
    Query(query): Query<LoginQuery>,
    viewer: Option<AuthenticatedUser>,
) -> Markup {
    templates::auth::login(
        viewer.as_ref().map(AuthenticatedUser::user),
        &LoginForm::default(),
        &FormErrors::new(),
        query.next.as_deref(),
    )
}

async fn login(
    LoginPath(): LoginPath,
    Query(query): Query<LoginQuery>,
    State(db): State<Arc<DbClient>>,
    State(config): State<Arc<Config>>,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let values = LoginForm {
        password: String::new(),
        ..form.clone()
    };
    let next = query.next.as_deref();
    let rejected =
        |errors: &FormErrors| templates::auth::login(None, &values, errors, next).into_response();

    let (username, password) = match form.clean() {
        Ok(credentials) => credentials,
        Err(errors) => return Ok(rejected(&errors)),
    };

    let user = match db.fetch_credentials(&username).await? {
        Some((user, password_hash)) if verify_password(&password, &password_hash) => user,
        _ => {
            info!(%username, "Rejected login");
            let mut errors = FormErrors::new();
            errors.add(NON_FIELD_ERRORS, INVALID_LOGIN);
            return Ok(rejected(&errors));
        }
    };

    let ttl = config.session_ttl();
    let token = auth::start_session(&db, user.id, ttl).await?;

    Ok((
        [(SET_COOKIE, auth::session_cookie(&token, ttl))],
        Redirect::to(&redirect_target(next)),
    )
        .into_response())
}

async fn logout(
    LogoutPath(): LogoutPath,
    headers: HeaderMap,
    State(db): State<Arc<DbClient>>,
) -> Result<Response> {
    auth::end_session(&headers, &db).await?;

    Ok((
        [(SET_COOKIE, auth::expired_session_cookie())],
        templates::auth::logged_out(),
    )
        .into_response())
}
