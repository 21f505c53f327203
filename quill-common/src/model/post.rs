use crate::{
    model::{
        Id,
        group::{GroupMarker, GroupRef},
        user::{User, UserMarker},
    },
    util::truncate_chars,
};
use std::fmt::{Display, Formatter};
use time::UtcDateTime;

/// Number of characters of the text a post displays as.
pub const POST_DISPLAY_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: String,
    pub created_at: UtcDateTime,
    pub author: User,
    pub group: Option<GroupRef>,
    /// Path relative to the media root, e.g. `posts/pic.gif`.
    pub image: Option<String>,
    pub comment_count: u64,
}

impl Post {
    #[must_use]
    pub fn is_authored_by(&self, user: Id<UserMarker>) -> bool {
        self.author.id == user
    }

    #[must_use]
    pub fn content(&self) -> PostContent {
        PostContent {
            text: self.text.clone(),
            group: self.group.as_ref().map(|group| group.id),
            image: self.image.clone(),
        }
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(truncate_chars(&self.text, POST_DISPLAY_LEN))
    }
}

/// The author-editable part of a post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostContent {
    pub text: String,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}
