//! In-process tables with the same semantics as the PostgreSQL schema.

use crate::client::{DbError, Result};
use quill_common::{
    feed::{self, FeedScope},
    model::{
        Id,
        auth::{Authentication, SessionTokenHash},
        comment::{Comment, CommentMarker, CreateComment},
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker, GroupRef},
        post::{Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    pagination::{Page, Paginator},
};
use std::collections::{BTreeMap, BTreeSet};
use time::UtcDateTime;

#[derive(Clone, Debug)]
struct UserRow {
    user: User,
    password_hash: String,
}

#[derive(Clone, Debug)]
struct PostRow {
    author: Id<UserMarker>,
    content: PostContent,
    created_at: UtcDateTime,
}

#[derive(Clone, Debug)]
struct CommentRow {
    post: Id<PostMarker>,
    author: Id<UserMarker>,
    text: String,
    created_at: UtcDateTime,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryTables {
    users: BTreeMap<Id<UserMarker>, UserRow>,
    authentications: Vec<Authentication>,
    follows: BTreeSet<Follow>,
    groups: BTreeMap<Id<GroupMarker>, Group>,
    posts: BTreeMap<Id<PostMarker>, PostRow>,
    comments: BTreeMap<Id<CommentMarker>, CommentRow>,
}

impl MemoryTables {
    pub fn create_user(&mut self, id: Id<UserMarker>, user: &CreateUser) -> Result<User> {
        if self
            .users
            .values()
            .any(|row| row.user.username == user.username)
        {
            return Err(DbError::UniqueViolation);
        }

        let created = User {
            id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        };
        self.users.insert(
            id,
            UserRow {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
            },
        );

        Ok(created)
    }

    pub fn fetch_user(&self, user_id: Id<UserMarker>) -> Option<User> {
        self.users.get(&user_id).map(|row| row.user.clone())
    }

    fn user_row_by_username(&self, username: &str) -> Option<&UserRow> {
        self.users
            .values()
            .find(|row| row.user.username.get() == username)
    }

    pub fn fetch_user_by_username(&self, username: &str) -> Option<User> {
        self.user_row_by_username(username)
            .map(|row| row.user.clone())
    }

    pub fn fetch_credentials(&self, username: &str) -> Option<(User, String)> {
        self.user_row_by_username(username)
            .map(|row| (row.user.clone(), row.password_hash.clone()))
    }

    pub fn create_authentication(&mut self, authentication: &Authentication) -> Result<()> {
        if !self.users.contains_key(&authentication.user) {
            return Err(DbError::MissingReference);
        }
        if self
            .authentications
            .iter()
            .any(|existing| existing.token_hash == authentication.token_hash)
        {
            return Err(DbError::UniqueViolation);
        }

        self.authentications.push(authentication.clone());
        Ok(())
    }

    pub fn fetch_authentication(&self, token_hash: &SessionTokenHash) -> Option<Authentication> {
        self.authentications
            .iter()
            .find(|authentication| &authentication.token_hash == token_hash)
            .cloned()
    }

    pub fn delete_authentication(&mut self, token_hash: &SessionTokenHash) -> bool {
        let before = self.authentications.len();
        self.authentications
            .retain(|authentication| &authentication.token_hash != token_hash);
        self.authentications.len() != before
    }

    pub fn create_group(&mut self, id: Id<GroupMarker>, group: &CreateGroup) -> Result<Group> {
        if self.groups.values().any(|existing| existing.slug == group.slug) {
            return Err(DbError::UniqueViolation);
        }

        let created = Group {
            id,
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        };
        self.groups.insert(id, created.clone());
        Ok(created)
    }

    pub fn fetch_group(&self, group_id: Id<GroupMarker>) -> Option<Group> {
        self.groups.get(&group_id).cloned()
    }

    pub fn fetch_group_by_slug(&self, slug: &str) -> Option<Group> {
        self.groups
            .values()
            .find(|group| group.slug.get() == slug)
            .cloned()
    }

    pub fn fetch_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        groups
    }

    fn check_post_references(&self, author: Id<UserMarker>, content: &PostContent) -> Result<()> {
        let group_exists = content
            .group
            .is_none_or(|group| self.groups.contains_key(&group));
        if self.users.contains_key(&author) && group_exists {
            Ok(())
        } else {
            Err(DbError::MissingReference)
        }
    }

    pub fn create_post(
        &mut self,
        id: Id<PostMarker>,
        author: Id<UserMarker>,
        content: &PostContent,
        created_at: UtcDateTime,
    ) -> Result<()> {
        self.check_post_references(author, content)?;
        self.posts.insert(
            id,
            PostRow {
                author,
                content: content.clone(),
                created_at,
            },
        );
        Ok(())
    }

    fn join_post(&self, id: Id<PostMarker>, row: &PostRow) -> Option<Post> {
        let author = self.fetch_user(row.author)?;
        let group = row
            .content
            .group
            .and_then(|group| self.groups.get(&group))
            .map(GroupRef::from);
        let comment_count = self
            .comments
            .values()
            .filter(|comment| comment.post == id)
            .count();

        Some(Post {
            id,
            text: row.content.text.clone(),
            created_at: row.created_at,
            author,
            group,
            image: row.content.image.clone(),
            comment_count: comment_count as u64,
        })
    }

    pub fn fetch_post(&self, post_id: Id<PostMarker>) -> Option<Post> {
        self.posts
            .get(&post_id)
            .and_then(|row| self.join_post(post_id, row))
    }

    pub fn update_post(&mut self, post_id: Id<PostMarker>, content: &PostContent) -> Result<bool> {
        let Some(author) = self.posts.get(&post_id).map(|row| row.author) else {
            return Ok(false);
        };
        self.check_post_references(author, content)?;

        if let Some(row) = self.posts.get_mut(&post_id) {
            row.content = content.clone();
        }
        Ok(true)
    }

    pub fn delete_post(&mut self, post_id: Id<PostMarker>) -> bool {
        let removed = self.posts.remove(&post_id).is_some();
        self.comments.retain(|_, comment| comment.post != post_id);
        removed
    }

    fn feed(&self, scope: FeedScope) -> Vec<Post> {
        let posts = self
            .posts
            .iter()
            .filter_map(|(id, row)| self.join_post(*id, row));
        feed::assemble(scope, posts, &self.follows)
    }

    pub fn count_feed(&self, scope: FeedScope) -> usize {
        self.feed(scope).len()
    }

    pub fn fetch_feed(&self, scope: FeedScope, paginator: Paginator, requested_page: i64) -> Page<Post> {
        paginator.paginate(self.feed(scope), requested_page)
    }

    pub fn create_comment(
        &mut self,
        id: Id<CommentMarker>,
        comment: &CreateComment,
        created_at: UtcDateTime,
    ) -> Result<()> {
        if !self.posts.contains_key(&comment.post) || !self.users.contains_key(&comment.author) {
            return Err(DbError::MissingReference);
        }

        self.comments.insert(
            id,
            CommentRow {
                post: comment.post,
                author: comment.author,
                text: comment.text.clone(),
                created_at,
            },
        );
        Ok(())
    }

    pub fn fetch_comments(&self, post_id: Id<PostMarker>) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|(_, row)| row.post == post_id)
            .filter_map(|(id, row)| {
                Some(Comment {
                    id: *id,
                    post: row.post,
                    author: self.fetch_user(row.author)?,
                    text: row.text.clone(),
                    created_at: row.created_at,
                })
            })
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        comments
    }

    pub fn follow(&mut self, follow: Follow) -> Result<bool> {
        if !self.users.contains_key(&follow.user) || !self.users.contains_key(&follow.author) {
            return Err(DbError::MissingReference);
        }
        Ok(self.follows.insert(follow))
    }

    pub fn unfollow(&mut self, follow: Follow) -> bool {
        self.follows.remove(&follow)
    }

    pub fn is_following(&self, follow: Follow) -> bool {
        self.follows.contains(&follow)
    }

    pub fn count_following(&self, user: Id<UserMarker>) -> usize {
        self.follows.iter().filter(|follow| follow.user == user).count()
    }

    pub fn count_followers(&self, author: Id<UserMarker>) -> usize {
        self.follows
            .iter()
            .filter(|follow| follow.author == author)
            .count()
    }
}
