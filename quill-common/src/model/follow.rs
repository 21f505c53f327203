use crate::model::{Id, user::UserMarker};

/// `user` subscribes to the posts of `author`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Follow {
    pub user: Id<UserMarker>,
    pub author: Id<UserMarker>,
}

impl Follow {
    #[must_use]
    pub fn new(user: Id<UserMarker>, author: Id<UserMarker>) -> Self {
        Self { user, author }
    }

    #[must_use]
    pub fn is_self_follow(self) -> bool {
        self.user == self.author
    }
}
