//! Which posts a page shows, and in what order.

use crate::model::{
    Id,
    follow::Follow,
    group::GroupMarker,
    post::Post,
    user::UserMarker,
};
use std::{cmp::Ordering, collections::HashSet};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FeedScope {
    /// Every post; the home page.
    All,
    Group(Id<GroupMarker>),
    /// Posts written by one author; the profile page.
    Author(Id<UserMarker>),
    /// Posts by every author the given user follows.
    Following(Id<UserMarker>),
}

impl FeedScope {
    /// `followed` holds the authors followed by the user of a
    /// [`FeedScope::Following`] scope and is ignored by the other scopes.
    #[must_use]
    pub fn matches(self, post: &Post, followed: &HashSet<Id<UserMarker>>) -> bool {
        match self {
            FeedScope::All => true,
            FeedScope::Group(group) => post.group.as_ref().is_some_and(|g| g.id == group),
            FeedScope::Author(author) => post.author.id == author,
            FeedScope::Following(_) => followed.contains(&post.author.id),
        }
    }

    /// Authors whose posts a [`FeedScope::Following`] scope admits.
    #[must_use]
    pub fn followed_authors<'a>(
        self,
        follows: impl IntoIterator<Item = &'a Follow>,
    ) -> HashSet<Id<UserMarker>> {
        match self {
            FeedScope::Following(user) => follows
                .into_iter()
                .filter(|follow| follow.user == user)
                .map(|follow| follow.author)
                .collect(),
            _ => HashSet::new(),
        }
    }
}

/// Newest first. Posts created in the same instant fall back to id order,
/// which follows creation order for snowflake ids.
#[must_use]
pub fn newest_first(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Filters `posts` down to `scope` and orders them newest first.
pub fn assemble<'a>(
    scope: FeedScope,
    posts: impl IntoIterator<Item = Post>,
    follows: impl IntoIterator<Item = &'a Follow>,
) -> Vec<Post> {
    let followed = scope.followed_authors(follows);

    let mut feed: Vec<Post> = posts
        .into_iter()
        .filter(|post| scope.matches(post, &followed))
        .collect();
    feed.sort_by(newest_first);
    feed
}
