use crate::server::{
    routes::users::{FollowPath, UnfollowPath},
    templates::{layout, posts},
};
use maud::{Markup, html};
use quill_common::{
    model::{post::Post, user::User},
    pagination::Page,
};

pub struct Profile<'a> {
    pub author: &'a User,
    pub page: &'a Page<Post>,
    /// Whether the viewer follows `author`; always `false` for guests.
    pub following: bool,
    pub follower_count: usize,
    pub following_count: usize,
}

pub fn profile(viewer: Option<&User>, profile: &Profile<'_>) -> Markup {
    let author = profile.author;
    let username = author.username.get().to_owned();
    let is_self = viewer.is_some_and(|user| user.id == author.id);

    let content = html! {
        section.profile {
            h1 { (author.display_name()) }
            p { "@" (username) }
            ul {
                li { "Posts: " (profile.page.total) }
                li { "Followers: " (profile.follower_count) }
                li { "Following: " (profile.following_count) }
            }
            @if viewer.is_some() && !is_self {
                @if profile.following {
                    a.button href=(UnfollowPath { username: username.clone() }.to_string()) {
                        "Unfollow"
                    }
                } @else {
                    a.button href=(FollowPath { username: username.clone() }.to_string()) {
                        "Follow"
                    }
                }
            }
        }
        (posts::feed(profile.page))
    };
    layout(&author.display_name(), viewer, content)
}
