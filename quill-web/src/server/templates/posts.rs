use crate::server::{
    routes::posts::{CommentPath, EditPostPath, GroupPath, NewPostPath, PostPath},
    routes::users::ProfilePath,
    templates::{field_errors, format_time, layout, non_field_errors, pagination},
};
use maud::{Markup, html};
use quill_common::{
    form::{FormErrors, PostForm},
    model::{
        comment::Comment,
        group::Group,
        post::Post,
        user::User,
    },
    pagination::Page,
};

fn post_path(post: &Post) -> String {
    PostPath {
        username: post.author.username.get().to_owned(),
        post_id: post.id,
    }
    .to_string()
}

fn profile_path(user: &User) -> String {
    ProfilePath {
        username: user.username.get().to_owned(),
    }
    .to_string()
}

fn post_card(post: &Post) -> Markup {
    html! {
        article.post {
            p.meta {
                a href=(profile_path(&post.author)) { (post.author.display_name()) }
                " · "
                time { (format_time(post.created_at)) }
                @if let Some(group) = &post.group {
                    " · "
                    a href=(GroupPath { slug: group.slug.get().to_owned() }.to_string()) {
                        (group.title)
                    }
                }
            }
            @if let Some(image) = &post.image {
                img src=(format!("/media/{image}")) alt=(post.to_string());
            }
            p { (post.text) }
            p.links {
                a href=(post_path(post)) {
                    "Comments (" (post.comment_count) ")"
                }
            }
        }
    }
}

pub(super) fn feed(page: &Page<Post>) -> Markup {
    html! {
        @if page.is_empty() {
            p { "No posts yet." }
        }
        @for post in &page.items {
            (post_card(post))
        }
        (pagination(page))
    }
}

/// The home page feed. This is the part that gets cached and shared between
/// visitors, so it must not depend on who is looking.
pub fn index_feed(page: &Page<Post>) -> Markup {
    html! {
        h1 { "Latest posts" }
        (feed(page))
    }
}

pub fn index(viewer: Option<&User>, feed: Markup) -> Markup {
    layout("Latest posts", viewer, feed)
}

pub fn group(viewer: Option<&User>, group: &Group, page: &Page<Post>) -> Markup {
    let content = html! {
        h1 { (group.title) }
        p.description { (group.description) }
        (feed(page))
    };
    layout(&group.to_string(), viewer, content)
}

pub fn follow(viewer: &User, page: &Page<Post>) -> Markup {
    let content = html! {
        h1 { "Posts by authors you follow" }
        (feed(page))
    };
    layout("Following", Some(viewer), content)
}

fn author_card(author: &User, post_count: usize) -> Markup {
    html! {
        aside.author {
            h2 { a href=(profile_path(author)) { (author.display_name()) } }
            p { "@" (author.username.get()) }
            p { "Posts: " (post_count) }
        }
    }
}

fn comment_list(comments: &[Comment]) -> Markup {
    html! {
        section.comments {
            h2 { "Comments" }
            @for comment in comments {
                div.comment {
                    p.meta {
                        a href=(profile_path(&comment.author)) { (comment.author.display_name()) }
                        " · "
                        time { (format_time(comment.created_at)) }
                    }
                    p { (comment.text) }
                }
            }
        }
    }
}

fn comment_form(post: &Post, text: &str, errors: &FormErrors) -> Markup {
    let action = CommentPath {
        username: post.author.username.get().to_owned(),
        post_id: post.id,
    }
    .to_string();

    html! {
        form.comment-form method="post" action=(action) {
            label for="id_text" { "Leave a comment" }
            textarea #id_text name="text" cols="80" rows="8" { (text) }
            (field_errors(errors, "text"))
            button type="submit" { "Send" }
        }
    }
}

pub struct PostDetail<'a> {
    pub post: &'a Post,
    pub author_post_count: usize,
    pub comments: &'a [Comment],
}

pub fn detail(viewer: Option<&User>, detail: &PostDetail<'_>) -> Markup {
    let post = detail.post;
    let can_edit = viewer.is_some_and(|user| post.is_authored_by(user.id));

    let content = html! {
        (author_card(&post.author, detail.author_post_count))
        (post_card(post))
        @if can_edit {
            a href=(EditPostPath {
                username: post.author.username.get().to_owned(),
                post_id: post.id,
            }.to_string()) { "Edit" }
        }
        (comment_list(detail.comments))
        @if viewer.is_some() {
            (comment_form(post, "", &FormErrors::new()))
        }
    };
    layout(&post.to_string(), viewer, content)
}

/// Shown when a comment submission is rejected, and on `GET` of the comment
/// endpoint.
pub fn comments(
    viewer: &User,
    post: &Post,
    comments: &[Comment],
    text: &str,
    errors: &FormErrors,
) -> Markup {
    let content = html! {
        (post_card(post))
        (comment_list(comments))
        (comment_form(post, text, errors))
    };
    layout(&post.to_string(), Some(viewer), content)
}

pub struct PostFormPage<'a> {
    pub groups: &'a [Group],
    pub values: &'a PostForm,
    pub errors: &'a FormErrors,
    /// The post being edited; `None` when writing a new one.
    pub editing: Option<&'a Post>,
}

pub fn post_form(viewer: &User, page: &PostFormPage<'_>) -> Markup {
    let (title, action, submit) = match page.editing {
        Some(post) => (
            "Edit post",
            EditPostPath {
                username: post.author.username.get().to_owned(),
                post_id: post.id,
            }
            .to_string(),
            "Save",
        ),
        None => ("New post", NewPostPath().to_string(), "Publish"),
    };
    let selected_group = page.values.group.trim();

    let content = html! {
        h1 { (title) }
        form method="post" action=(action) enctype="multipart/form-data" {
            (non_field_errors(page.errors))
            p {
                label for="id_text" { "Text" }
                textarea #id_text name="text" rows="10" { (page.values.text) }
                (field_errors(page.errors, "text"))
            }
            p {
                label for="id_group" { "Group" }
                select #id_group name="group" {
                    option value="" selected[selected_group.is_empty()] { "---------" }
                    @for group in page.groups {
                        @let value = group.id.to_string();
                        option value=(value) selected[value == selected_group] { (group.title) }
                    }
                }
                (field_errors(page.errors, "group"))
            }
            p {
                label for="id_image" { "Image" }
                @if let Some(image) = page.editing.and_then(|post| post.image.as_deref()) {
                    span { "Currently: " a href=(format!("/media/{image}")) { (image) } }
                    " "
                    input #id_image_clear type="checkbox" name="image-clear"
                        checked[page.values.image_clear.is_some()];
                    label for="id_image_clear" { "Clear" }
                }
                input #id_image type="file" name="image" accept="image/*";
                (field_errors(page.errors, "image"))
            }
            button type="submit" { (submit) }
        }
    };
    layout(title, Some(viewer), content)
}
