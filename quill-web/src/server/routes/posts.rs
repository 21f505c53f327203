use crate::{
    config::Config,
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        cache::PageCache,
        form::{Form, PostSubmission},
        media,
        routes::RequestedPage,
        templates::{
            self,
            posts::{PostDetail, PostFormPage},
        },
    },
};
use axum::{
    extract::State,
    http::Uri,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use maud::{Markup, PreEscaped};
use quill_common::{
    feed::FeedScope,
    form::{CleanPost, CommentForm, FormErrors, INVALID_CHOICE, PostForm},
    model::{
        Id,
        comment::CreateComment,
        group::{Group, GroupMarker},
        post::{Post, PostContent, PostMarker},
    },
};
use quill_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(group_posts)
        .typed_get(new_post_form)
        .typed_post(create_post)
        .typed_get(post_view)
        .typed_get(edit_post_form)
        .typed_post(edit_post)
        .typed_get(comments)
        .typed_post(add_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
pub struct IndexPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
pub struct GroupPath {
    pub slug: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/new/", rejection(ServerError))]
pub struct NewPostPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/{post_id}/", rejection(ServerError))]
pub struct PostPath {
    pub username: String,
    pub post_id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/{post_id}/edit/", rejection(ServerError))]
pub struct EditPostPath {
    pub username: String,
    pub post_id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/{username}/{post_id}/comment/", rejection(ServerError))]
pub struct CommentPath {
    pub username: String,
    pub post_id: Id<PostMarker>,
}

/// The post with `post_id`, provided `username` wrote it.
async fn fetch_authored_post(
    db: &DbClient,
    username: String,
    post_id: Id<PostMarker>,
) -> Result<Post> {
    match db.fetch_post(post_id).await? {
        Some(post) if post.author.username.get() == username => Ok(post),
        _ => Err(ServerError::PostNotFound { username, post_id }),
    }
}

fn redirect_to_post(post: &Post) -> Response {
    let path = PostPath {
        username: post.author.username.get().to_owned(),
        post_id: post.id,
    };
    Redirect::to(&path.to_string()).into_response()
}

/// Form validation plus the one check that needs the store: the selected
/// group has to exist.
fn clean_post(form: PostForm, groups: &[Group]) -> Result<CleanPost, FormErrors> {
    let unknown_group = form
        .group
        .trim()
        .parse::<Id<GroupMarker>>()
        .is_ok_and(|id| !groups.iter().any(|group| group.id == id));

    let cleaned = form.clean();
    if !unknown_group {
        return cleaned;
    }

    let mut errors = cleaned.err().unwrap_or_default();
    errors.add("group", INVALID_CHOICE);
    Err(errors)
}

/// What to show again in a rejected form. Uploaded files are not echoed back.
fn submitted_values(form: &PostForm) -> PostForm {
    PostForm {
        text: form.text.clone(),
        group: form.group.clone(),
        image: None,
        image_clear: form.image_clear.clone(),
    }
}

async fn index(
    IndexPath(): IndexPath,
    RequestedPage(page_number): RequestedPage,
    uri: Uri,
    viewer: Option<AuthenticatedUser>,
    State(db): State<Arc<DbClient>>,
    State(page_cache): State<PageCache>,
    State(config): State<Arc<Config>>,
) -> Result<Markup> {
    let viewer = viewer.as_ref().map(AuthenticatedUser::user);
    let cache_key = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_owned(), ToString::to_string);
    if let Some(feed) = page_cache.get(&cache_key).await {
        return Ok(templates::posts::index(viewer, PreEscaped(feed)));
    }

    let page = db
        .fetch_feed(FeedScope::All, config.paginator(), page_number)
        .await?;
    let feed = templates::posts::index_feed(&page);
    page_cache.insert(cache_key, feed.0.clone()).await;

    Ok(templates::posts::index(viewer, feed))
}

async fn group_posts(
    GroupPath { slug }: GroupPath,
    RequestedPage(page_number): RequestedPage,
    viewer: Option<AuthenticatedUser>,
    State(db): State<Arc<DbClient>>,
    State(config): State<Arc<Config>>,
) -> Result<Markup> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupNotFound(slug))?;

    let page = db
        .fetch_feed(FeedScope::Group(group.id), config.paginator(), page_number)
        .await?;

    Ok(templates::posts::group(
        viewer.as_ref().map(AuthenticatedUser::user),
        &group,
        &page,
    ))
}

async fn new_post_form(
    NewPostPath(): NewPostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Markup> {
    let groups = db.fetch_groups().await?;
    let page = PostFormPage {
        groups: &groups,
        values: &PostForm::default(),
        errors: &FormErrors::new(),
        editing: None,
    };

    Ok(templates::posts::post_form(user.user(), &page))
}

#[axum::debug_handler(state = crate::server::ServerState)]
async fn create_post(
    NewPostPath(): NewPostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    State(config): State<Arc<Config>>,
    PostSubmission(form): PostSubmission,
) -> Result<Response> {
    let groups = db.fetch_groups().await?;
    let values = submitted_values(&form);

    let post = match clean_post(form, &groups) {
        Ok(post) => post,
        Err(errors) => {
            let page = PostFormPage {
                groups: &groups,
                values: &values,
                errors: &errors,
                editing: None,
            };
            return Ok(templates::posts::post_form(user.user(), &page).into_response());
        }
    };

    let image = match &post.image {
        Some((upload, kind)) => {
            Some(media::store_post_image(&config.media_root, upload, *kind).await?)
        }
        None => None,
    };
    let content = PostContent {
        text: post.text,
        group: post.group,
        image,
    };
    if let Err(error) = db.create_post(user.user_id(), &content).await {
        if let Some(image) = &content.image {
            media::discard_post_image(&config.media_root, image).await;
        }
        return Err(error.into());
    }

    Ok(Redirect::to(&IndexPath().to_string()).into_response())
}

async fn post_view(
    PostPath { username, post_id }: PostPath,
    viewer: Option<AuthenticatedUser>,
    State(db): State<Arc<DbClient>>,
) -> Result<Markup> {
    let post = fetch_authored_post(&db, username, post_id).await?;
    let comments = db.fetch_comments(post.id).await?;
    let author_post_count = db.count_feed(FeedScope::Author(post.author.id)).await?;

    let detail = PostDetail {
        post: &post,
        author_post_count,
        comments: &comments,
    };
    Ok(templates::posts::detail(
        viewer.as_ref().map(AuthenticatedUser::user),
        &detail,
    ))
}

async fn edit_post_form(
    EditPostPath { username, post_id }: EditPostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Response> {
    let post = fetch_authored_post(&db, username, post_id).await?;
    if !post.is_authored_by(user.user_id()) {
        return Ok(redirect_to_post(&post));
    }

    let groups = db.fetch_groups().await?;
    let values = PostForm {
        text: post.text.clone(),
        group: post
            .group
            .as_ref()
            .map(|group| group.id.to_string())
            .unwrap_or_default(),
        ..PostForm::default()
    };
    let page = PostFormPage {
        groups: &groups,
        values: &values,
        errors: &FormErrors::new(),
        editing: Some(&post),
    };

    Ok(templates::posts::post_form(user.user(), &page).into_response())
}

async fn edit_post(
    EditPostPath { username, post_id }: EditPostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    State(config): State<Arc<Config>>,
    submission: Result<PostSubmission, ServerError>,
) -> Result<Response> {
    let post = fetch_authored_post(&db, username, post_id).await?;
    if !post.is_authored_by(user.user_id()) {
        return Ok(redirect_to_post(&post));
    }
    let PostSubmission(form) = submission?;

    let groups = db.fetch_groups().await?;
    let values = submitted_values(&form);

    let cleaned = match clean_post(form, &groups) {
        Ok(cleaned) => cleaned,
        Err(errors) => {
            let page = PostFormPage {
                groups: &groups,
                values: &values,
                errors: &errors,
                editing: Some(&post),
            };
            return Ok(templates::posts::post_form(user.user(), &page).into_response());
        }
    };

    let stored = match &cleaned.image {
        Some((upload, kind)) => {
            Some(media::store_post_image(&config.media_root, upload, *kind).await?)
        }
        None => None,
    };
    // Without a new upload the current image stays unless it was cleared.
    let image = match &stored {
        Some(stored) => Some(stored.clone()),
        None if cleaned.clear_image => None,
        None => post.image.clone(),
    };
    let content = PostContent {
        text: cleaned.text,
        group: cleaned.group,
        image,
    };

    let updated = db.update_post(post.id, &content).await;
    if !matches!(updated, Ok(true))
        && let Some(stored) = &stored
    {
        media::discard_post_image(&config.media_root, stored).await;
    }
    if !updated? {
        return Err(ServerError::PostNotFound {
            username: post.author.username.get().to_owned(),
            post_id: post.id,
        });
    }

    Ok(redirect_to_post(&post))
}

async fn comments(
    CommentPath { username, post_id }: CommentPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Markup> {
    let post = fetch_authored_post(&db, username, post_id).await?;
    let comments = db.fetch_comments(post.id).await?;

    Ok(templates::posts::comments(
        user.user(),
        &post,
        &comments,
        "",
        &FormErrors::new(),
    ))
}

async fn add_comment(
    CommentPath { username, post_id }: CommentPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Form(form): Form<CommentForm>,
) -> Result<Response> {
    let post = fetch_authored_post(&db, username, post_id).await?;
    let submitted = form.text.clone();

    match form.clean() {
        Ok(text) => {
            let comment = CreateComment {
                post: post.id,
                author: user.user_id(),
                text,
            };
            db.create_comment(&comment).await?;
            Ok(redirect_to_post(&post))
        }
        Err(errors) => {
            let comments = db.fetch_comments(post.id).await?;
            let page =
                templates::posts::comments(user.user(), &post, &comments, &submitted, &errors);
            Ok(page.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::test_util::{Multipart, TestApp, body_string, location};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use quill_common::{
        feed::FeedScope,
        form::{IMAGE_CONTRADICTION, INVALID_CHOICE, INVALID_IMAGE, REQUIRED},
        model::{Id, post::PostMarker},
    };

    const SMALL_GIF: &[u8] = b"GIF89a\x02\x00\x01\x00\x80\x00\x00\x00\x00\x00\xFF\xFF\xFF!\xF9\x04\x00\x00\x00\x00\x00,\x00\x00\x00\x00\x02\x00\x01\x00\x00\x02\x02\x0C\n\x00;";

    async fn stored_image(app: &TestApp, post: Id<PostMarker>) -> Option<String> {
        app.db().fetch_post(post).await.unwrap().unwrap().image
    }

    fn article_count(page: &str) -> usize {
        page.matches("<article class=\"post\">").count()
    }

    #[tokio::test]
    async fn public_pages_are_readable_by_guests() {
        let app = TestApp::new();
        let (author, _) = app.user("TatianaK").await;
        let group = app.group("test-slug").await;
        let post = app.post(&author, "Test post text", Some(group.id)).await;

        for path in [
            "/".to_owned(),
            "/group/test-slug/".to_owned(),
            "/TatianaK/".to_owned(),
            format!("/TatianaK/{post}/"),
        ] {
            let response = app.get(&path, None).await;
            assert_eq!(response.status(), StatusCode::OK, "{path}");
            assert!(body_string(response).await.contains("Test post text"), "{path}");
        }

        assert_eq!(app.get("/404/", None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn guests_are_sent_to_login_with_next() {
        let app = TestApp::new();
        let (author, _) = app.user("TatianaK").await;
        let post = app.post(&author, "text", None).await;

        for path in [
            "/new/".to_owned(),
            "/follow/".to_owned(),
            format!("/TatianaK/{post}/edit/"),
            format!("/TatianaK/{post}/comment/"),
            "/TatianaK/follow/".to_owned(),
        ] {
            let response = app.get(&path, None).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
            assert_eq!(location(&response), format!("/auth/login/?next={path}"));
        }

        let before = app.db().count_feed(FeedScope::All).await.unwrap();
        let response = app.post_form("/new/", None, "text=hello").await;
        assert_eq!(location(&response), "/auth/login/?next=/new/");
        assert_eq!(app.db().count_feed(FeedScope::All).await.unwrap(), before);
    }

    #[tokio::test]
    async fn missing_things_are_not_found() {
        let app = TestApp::new();
        let (author, _) = app.user("TatianaK").await;
        app.user("AndreyG").await;
        let post = app.post(&author, "text", None).await;

        for path in [
            "/group/unknown/".to_owned(),
            "/nobody/".to_owned(),
            format!("/AndreyG/{post}/"),
            "/TatianaK/12345/".to_owned(),
            "/TatianaK/not-a-number/".to_owned(),
        ] {
            let response = app.get(&path, None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
            assert!(body_string(response).await.contains(&path));
        }
    }

    #[tokio::test]
    async fn home_page_is_paginated() {
        let app = TestApp::new();
        let (author, _) = app.user("leo").await;
        for n in 0..13 {
            app.post(&author, &format!("post number {n}"), None).await;
        }

        let first = body_string(app.get("/", None).await).await;
        assert_eq!(article_count(&first), 10);
        assert!(first.contains("post number 12"));
        assert!(!first.contains("post number 2<"));

        let second = body_string(app.get("/?page=2", None).await).await;
        assert_eq!(article_count(&second), 3);
        assert!(second.contains("post number 0"));

        let clamped = body_string(app.get("/?page=99", None).await).await;
        assert_eq!(article_count(&clamped), 3);
        let garbage = body_string(app.get("/?page=abc", None).await).await;
        assert_eq!(article_count(&garbage), 10);
    }

    #[tokio::test]
    async fn home_page_is_served_from_cache_until_cleared() {
        let app = TestApp::new();
        let (author, _) = app.user("leo").await;
        let post = app.post(&author, "soon to be deleted", None).await;

        assert!(body_string(app.get("/", None).await).await.contains("soon to be deleted"));

        app.db().delete_post(post).await.unwrap();
        assert!(body_string(app.get("/", None).await).await.contains("soon to be deleted"));
        // A different query string is a different cache entry.
        assert!(!body_string(app.get("/?page=1", None).await).await.contains("soon to be deleted"));

        app.state.page_cache.clear();
        assert!(!body_string(app.get("/", None).await).await.contains("soon to be deleted"));
    }

    #[tokio::test]
    async fn cached_home_page_greets_each_viewer() {
        let app = TestApp::new();
        let (author, cookie) = app.user("leo").await;
        app.post(&author, "shared feed", None).await;

        let as_guest = body_string(app.get("/", None).await).await;
        assert!(as_guest.contains("Log in"));

        let as_leo = body_string(app.get("/", Some(&cookie)).await).await;
        assert!(as_leo.contains("shared feed"));
        assert!(as_leo.contains("Log out"));
        assert!(!as_leo.contains("Log in"));

        let as_guest_again = body_string(app.get("/", None).await).await;
        assert!(as_guest_again.contains("Log in"));
        assert!(!as_guest_again.contains("Log out"));
    }

    #[tokio::test]
    async fn new_post_is_created_and_redirects_home() {
        let app = TestApp::new();
        let (author, cookie) = app.user("leo").await;
        let group = app.group("cats").await;

        let form = app.get("/new/", Some(&cookie)).await;
        assert_eq!(form.status(), StatusCode::OK);
        assert!(body_string(form).await.contains("Group cats"));

        let response = app
            .post_form("/new/", Some(&cookie), &format!("text=Hello+there&group={}", group.id))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let page = app
            .db()
            .fetch_feed(FeedScope::Group(group.id), Default::default(), 1)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].text, "Hello there");
        assert_eq!(page.items[0].author.id, author.id);
    }

    #[tokio::test]
    async fn invalid_posts_are_not_saved() {
        let app = TestApp::new();
        let (_, cookie) = app.user("leo").await;

        let blank = app.post_form("/new/", Some(&cookie), "text=+++&group=").await;
        assert_eq!(blank.status(), StatusCode::OK);
        assert!(body_string(blank).await.contains(REQUIRED));

        let unknown_group = app
            .post_form("/new/", Some(&cookie), "text=hello&group=12345")
            .await;
        let page = body_string(unknown_group).await;
        assert!(page.contains(INVALID_CHOICE));
        assert!(page.contains("hello"));

        let not_an_image = Multipart::default()
            .text("text", "with a fake picture")
            .file("image", "cat.gif", "image/gif", b"definitely not a gif");
        let response = app.post_multipart("/new/", Some(&cookie), not_an_image).await;
        assert!(body_string(response).await.contains(INVALID_IMAGE));

        assert_eq!(app.db().count_feed(FeedScope::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn uploaded_images_are_stored_and_served() {
        let app = TestApp::new();
        let (author, cookie) = app.user("leo").await;

        let body = Multipart::default()
            .text("text", "a picture")
            .text("group", "")
            .file("image", "small.gif", "image/gif", SMALL_GIF);
        let response = app.post_multipart("/new/", Some(&cookie), body).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let page = app
            .db()
            .fetch_feed(FeedScope::Author(author.id), Default::default(), 1)
            .await
            .unwrap();
        let image = page.items[0].image.clone().unwrap();
        assert!(image.starts_with("posts/"));

        let served = app.get(&format!("/media/{image}"), None).await;
        assert_eq!(served.status(), StatusCode::OK);

        let _ = tokio::fs::remove_dir_all(&app.state.config.media_root).await;
    }

    #[tokio::test]
    async fn only_the_author_can_edit() {
        let app = TestApp::new();
        let (author, author_cookie) = app.user("TatianaK").await;
        let (_, other_cookie) = app.user("AndreyG").await;
        let post = app.post(&author, "original", None).await;
        let edit_path = format!("/TatianaK/{post}/edit/");
        let post_path = format!("/TatianaK/{post}/");

        let response = app.get(&edit_path, Some(&other_cookie)).await;
        assert_eq!(location(&response), post_path);
        let response = app
            .post_form(&edit_path, Some(&other_cookie), "text=hijacked")
            .await;
        assert_eq!(location(&response), post_path);
        assert_eq!(app.db().fetch_post(post).await.unwrap().unwrap().text, "original");

        let form = body_string(app.get(&edit_path, Some(&author_cookie)).await).await;
        assert!(form.contains("original"));
        let response = app
            .post_form(&edit_path, Some(&author_cookie), "text=edited&group=")
            .await;
        assert_eq!(location(&response), post_path);
        assert_eq!(app.db().fetch_post(post).await.unwrap().unwrap().text, "edited");
    }

    #[tokio::test]
    async fn unreadable_edits_by_others_still_redirect() {
        let app = TestApp::new();
        let (author, author_cookie) = app.user("TatianaK").await;
        let (_, other_cookie) = app.user("AndreyG").await;
        let post = app.post(&author, "original", None).await;
        let edit_path = format!("/TatianaK/{post}/edit/");

        for content_type in [Some("text/plain"), None] {
            let mut request = Request::post(&edit_path).header(header::COOKIE, &other_cookie);
            if let Some(content_type) = content_type {
                request = request.header(header::CONTENT_TYPE, content_type);
            }
            let response = app
                .request(request.body(Body::from("text=hijacked")).unwrap())
                .await;

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), format!("/TatianaK/{post}/"));
        }

        let request = Request::post(&edit_path)
            .header(header::COOKIE, &author_cookie)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("text=edited"))
            .unwrap();
        assert_eq!(app.request(request).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.db().fetch_post(post).await.unwrap().unwrap().text, "original");
    }

    #[tokio::test]
    async fn edits_can_keep_replace_or_clear_the_image() {
        let app = TestApp::new();
        let (author, cookie) = app.user("leo").await;
        let post = app.post(&author, "with picture", None).await;
        let edit_path = format!("/leo/{post}/edit/");

        let body = Multipart::default()
            .text("text", "with picture")
            .file("image", "small.gif", "image/gif", SMALL_GIF);
        app.post_multipart(&edit_path, Some(&cookie), body).await;
        let uploaded = stored_image(&app, post).await.unwrap();

        app.post_form(&edit_path, Some(&cookie), "text=still+a+picture").await;
        assert_eq!(stored_image(&app, post).await, Some(uploaded.clone()));

        let form = body_string(app.get(&edit_path, Some(&cookie)).await).await;
        assert!(form.contains("name=\"image-clear\""));

        let both = Multipart::default()
            .text("text", "both")
            .text("image-clear", "on")
            .file("image", "small.gif", "image/gif", SMALL_GIF);
        let response = app.post_multipart(&edit_path, Some(&cookie), both).await;
        assert!(body_string(response).await.contains(IMAGE_CONTRADICTION));
        assert_eq!(stored_image(&app, post).await, Some(uploaded.clone()));

        let response = app
            .post_form(&edit_path, Some(&cookie), "text=no+picture&image-clear=on")
            .await;
        assert_eq!(location(&response), format!("/leo/{post}/"));
        assert_eq!(stored_image(&app, post).await, None);

        let _ = tokio::fs::remove_dir_all(&app.state.config.media_root).await;
    }

    #[tokio::test]
    async fn comments_are_added_to_the_post() {
        let app = TestApp::new();
        let (author, _) = app.user("TatianaK").await;
        let (_, cookie) = app.user("AndreyG").await;
        let post = app.post(&author, "discuss", None).await;
        let comment_path = format!("/TatianaK/{post}/comment/");

        let response = app
            .post_form(&comment_path, Some(&cookie), "text=Nice+post")
            .await;
        assert_eq!(location(&response), format!("/TatianaK/{post}/"));

        let rejected = app.post_form(&comment_path, Some(&cookie), "text=").await;
        assert_eq!(rejected.status(), StatusCode::OK);
        assert!(body_string(rejected).await.contains(REQUIRED));

        let comments = app.db().fetch_comments(post).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "Nice post");

        let detail = body_string(app.get(&format!("/TatianaK/{post}/"), None).await).await;
        assert!(detail.contains("Nice post"));
        assert!(detail.contains("Comments (1)"));
    }
}
