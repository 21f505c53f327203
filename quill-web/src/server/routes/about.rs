use crate::server::{ServerError, ServerRouter, auth::AuthenticatedUser, templates};
use axum_extra::routing::{RouterExt, TypedPath};
use maud::Markup;
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(author)
        .typed_get(tech)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/about/author/", rejection(ServerError))]
pub struct AboutAuthorPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/about/tech/", rejection(ServerError))]
pub struct AboutTechPath();

async fn author(AboutAuthorPath(): AboutAuthorPath, viewer: Option<AuthenticatedUser>) -> Markup {
    templates::about::author(viewer.as_ref().map(AuthenticatedUser::user))
}

async fn tech(AboutTechPath(): AboutTechPath, viewer: Option<AuthenticatedUser>) -> Markup {
    templates::about::tech(viewer.as_ref().map(AuthenticatedUser::user))
}

#[cfg(test)]
mod tests {
    use crate::server::test_util::{TestApp, body_string};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn static_pages_are_public() {
        let app = TestApp::new();

        for (path, heading) in [
            ("/about/author/", "About the author"),
            ("/about/tech/", "Technologies"),
        ] {
            let response = app.get(path, None).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_string(response).await.contains(heading));
        }
    }
}
