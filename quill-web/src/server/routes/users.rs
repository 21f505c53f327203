use crate::{
    config::Config,
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        routes::RequestedPage,
        templates::{self, users::Profile},
    },
};
use axum::{extract::State, response::Redirect};
use axum_extra::routing::{RouterExt, TypedPath};
use maud::Markup;
use quill_common::{
    feed::FeedScope,
    model::{follow::Follow, user::User},
};
use quill_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(follow_index)
        .typed_get(profile)
        .typed_get(profile_follow)
        .typed_get(profile_unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow/", rejection(ServerError))]
pub struct FollowIndexPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/", rejection(ServerError))]
pub struct ProfilePath {
    pub username: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/follow/", rejection(ServerError))]
pub struct FollowPath {
    pub username: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/unfollow/", rejection(ServerError))]
pub struct UnfollowPath {
    pub username: String,
}

async fn fetch_author(db: &DbClient, username: String) -> Result<User> {
    db.fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserNotFound(username))
}

fn redirect_to_profile(author: &User) -> Redirect {
    let path = ProfilePath {
        username: author.username.get().to_owned(),
    };
    Redirect::to(&path.to_string())
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    RequestedPage(page_number): RequestedPage,
    viewer: Option<AuthenticatedUser>,
    State(db): State<Arc<DbClient>>,
    State(config): State<Arc<Config>>,
) -> Result<Markup> {
    let author = fetch_author(&db, username).await?;

    let page = db
        .fetch_feed(FeedScope::Author(author.id), config.paginator(), page_number)
        .await?;
    let following = match &viewer {
        Some(viewer) => {
            db.is_following(Follow::new(viewer.user_id(), author.id))
                .await?
        }
        None => false,
    };
    let follower_count = db.count_followers(author.id).await?;
    let following_count = db.count_following(author.id).await?;

    let profile = Profile {
        author: &author,
        page: &page,
        following,
        follower_count,
        following_count,
    };
    Ok(templates::users::profile(
        viewer.as_ref().map(AuthenticatedUser::user),
        &profile,
    ))
}

async fn follow_index(
    FollowIndexPath(): FollowIndexPath,
    RequestedPage(page_number): RequestedPage,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    State(config): State<Arc<Config>>,
) -> Result<Markup> {
    let page = db
        .fetch_feed(
            FeedScope::Following(user.user_id()),
            config.paginator(),
            page_number,
        )
        .await?;

    Ok(templates::posts::follow(user.user(), &page))
}

async fn profile_follow(
    FollowPath { username }: FollowPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Redirect> {
    let author = fetch_author(&db, username).await?;

    let follow = Follow::new(user.user_id(), author.id);
    if follow.is_self_follow() {
        debug!(user = %author.id, "Ignoring request to follow oneself");
    } else {
        db.follow(follow).await?;
    }

    Ok(redirect_to_profile(&author))
}

async fn profile_unfollow(
    UnfollowPath { username }: UnfollowPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Redirect> {
    let author = fetch_author(&db, username).await?;
    db.unfollow(Follow::new(user.user_id(), author.id)).await?;

    Ok(redirect_to_profile(&author))
}

#[cfg(test)]
mod tests {
    use crate::server::test_util::{TestApp, body_string, location};
    use axum::http::StatusCode;
    use quill_common::model::follow::Follow;

    #[tokio::test]
    async fn profile_offers_follow_only_to_other_users() {
        let app = TestApp::new();
        let (author, author_cookie) = app.user("leo").await;
        let (_, reader_cookie) = app.user("reader").await;
        app.post(&author, "first", None).await;
        app.post(&author, "second", None).await;

        let as_guest = body_string(app.get("/leo/", None).await).await;
        assert!(as_guest.contains("Posts: 2"));
        assert!(!as_guest.contains("/leo/follow/"));

        let as_author = body_string(app.get("/leo/", Some(&author_cookie)).await).await;
        assert!(!as_author.contains("/leo/follow/"));

        let as_reader = body_string(app.get("/leo/", Some(&reader_cookie)).await).await;
        assert!(as_reader.contains("/leo/follow/"));
        assert!(!as_reader.contains("/leo/unfollow/"));
    }

    #[tokio::test]
    async fn following_shapes_the_follow_feed() {
        let app = TestApp::new();
        let (author, _) = app.user("leo").await;
        let (reader, cookie) = app.user("reader").await;
        let (stranger, _) = app.user("stranger").await;
        app.post(&author, "from leo", None).await;
        app.post(&stranger, "from a stranger", None).await;

        let empty = body_string(app.get("/follow/", Some(&cookie)).await).await;
        assert!(empty.contains("No posts yet."));

        for _ in 0..2 {
            let response = app.get("/leo/follow/", Some(&cookie)).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/leo/");
        }
        assert_eq!(app.db().count_following(reader.id).await.unwrap(), 1);
        assert_eq!(app.db().count_followers(author.id).await.unwrap(), 1);

        let feed = body_string(app.get("/follow/", Some(&cookie)).await).await;
        assert!(feed.contains("from leo"));
        assert!(!feed.contains("from a stranger"));

        let profile = body_string(app.get("/leo/", Some(&cookie)).await).await;
        assert!(profile.contains("/leo/unfollow/"));
        assert!(profile.contains("Followers: 1"));

        for _ in 0..2 {
            let response = app.get("/leo/unfollow/", Some(&cookie)).await;
            assert_eq!(location(&response), "/leo/");
        }
        assert!(
            !app.db()
                .is_following(Follow::new(reader.id, author.id))
                .await
                .unwrap()
        );
        let feed = body_string(app.get("/follow/", Some(&cookie)).await).await;
        assert!(!feed.contains("from leo"));
    }

    #[tokio::test]
    async fn following_oneself_is_ignored() {
        let app = TestApp::new();
        let (user, cookie) = app.user("leo").await;

        let response = app.get("/leo/follow/", Some(&cookie)).await;
        assert_eq!(location(&response), "/leo/");
        assert_eq!(app.db().count_following(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_authors_are_not_found() {
        let app = TestApp::new();
        let (_, cookie) = app.user("leo").await;

        for path in ["/nobody/", "/nobody/follow/", "/nobody/unfollow/"] {
            let response = app.get(path, Some(&cookie)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }
}
