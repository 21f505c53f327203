use crate::{memory::MemoryTables, postgres::PgStore};
use quill_common::{
    feed::FeedScope,
    model::{
        Id, ModelValidationError, QuillSnowflakeGenerator,
        auth::{Authentication, SessionTokenHash},
        comment::{Comment, CommentMarker, CreateComment},
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker},
        post::{Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    pagination::{Page, Paginator},
    snowflake::{ProcessId, SnowflakeError, WorkerId},
};
use sqlx::{PgPool, migrate::MigrateError};
use thiserror::Error;
use time::UtcDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error("Generating an id failed: {0}")]
    Snowflake(#[from] SnowflakeError),
    #[error("A row with the same unique key already exists")]
    UniqueViolation,
    #[error("A referenced row does not exist")]
    MissingReference,
}

enum Backend {
    Postgres(PgStore),
    Memory(Mutex<MemoryTables>),
}

/// The store for users, sessions, groups, posts, comments and follows.
pub struct DbClient {
    backend: Backend,
    snowflake_generator: Mutex<QuillSnowflakeGenerator>,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Postgres(_) => "postgres",
            Backend::Memory(_) => "memory",
        };
        f.debug_struct("DbClient")
            .field("backend", &backend)
            .finish_non_exhaustive()
    }
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self::with_backend(Backend::Postgres(PgStore::new(pool)), worker_id, process_id)
    }

    /// A store that lives only as long as the process; nothing is persisted.
    #[must_use]
    pub fn in_memory(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self::with_backend(
            Backend::Memory(Mutex::new(MemoryTables::default())),
            worker_id,
            process_id,
        )
    }

    fn with_backend(backend: Backend, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            backend,
            snowflake_generator: Mutex::new(QuillSnowflakeGenerator::new(worker_id, process_id)),
        }
    }

    /// Applies pending schema migrations. A no-op for the in-memory store.
    pub async fn migrate(&self) -> Result<()> {
        if let Backend::Postgres(store) = &self.backend {
            store.migrate().await?;
            info!("Database migrations applied");
        }
        Ok(())
    }

    async fn next_id<Marker>(&self, now: UtcDateTime) -> Result<Id<Marker>> {
        let snowflake = self.snowflake_generator.lock().await.generate_at(now)?;
        Ok(snowflake.into())
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let id = self.next_id(UtcDateTime::now()).await?;
        let created = match &self.backend {
            Backend::Postgres(store) => store.create_user(id, user).await?,
            Backend::Memory(tables) => tables.lock().await.create_user(id, user)?,
        };

        info!(user = %created.id, username = %created.username, "Created user");
        Ok(created)
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_user(user_id).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_user(user_id)),
        }
    }

    pub async fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_user_by_username(username).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_user_by_username(username)),
        }
    }

    /// The user and their stored password hash.
    pub async fn fetch_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_credentials(username).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_credentials(username)),
        }
    }

    pub async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        match &self.backend {
            Backend::Postgres(store) => store.create_authentication(authentication).await,
            Backend::Memory(tables) => tables.lock().await.create_authentication(authentication),
        }
    }

    pub async fn fetch_authentication(
        &self,
        token_hash: &SessionTokenHash,
    ) -> Result<Option<Authentication>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_authentication(token_hash).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_authentication(token_hash)),
        }
    }

    pub async fn delete_authentication(&self, token_hash: &SessionTokenHash) -> Result<bool> {
        match &self.backend {
            Backend::Postgres(store) => store.delete_authentication(token_hash).await,
            Backend::Memory(tables) => Ok(tables.lock().await.delete_authentication(token_hash)),
        }
    }

    pub async fn create_group(&self, group: &CreateGroup) -> Result<Group> {
        let id = self.next_id(UtcDateTime::now()).await?;
        let created = match &self.backend {
            Backend::Postgres(store) => store.create_group(id, group).await?,
            Backend::Memory(tables) => tables.lock().await.create_group(id, group)?,
        };

        info!(group = %created.id, slug = %created.slug, "Created group");
        Ok(created)
    }

    pub async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_group(group_id).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_group(group_id)),
        }
    }

    pub async fn fetch_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_group_by_slug(slug).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_group_by_slug(slug)),
        }
    }

    /// All groups ordered by title.
    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_groups().await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_groups()),
        }
    }

    pub async fn create_post(
        &self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> Result<Id<PostMarker>> {
        let now = UtcDateTime::now();
        let id = self.next_id(now).await?;
        match &self.backend {
            Backend::Postgres(store) => store.create_post(id, author, content, now).await?,
            Backend::Memory(tables) => tables.lock().await.create_post(id, author, content, now)?,
        }

        info!(post = %id, %author, "Created post");
        Ok(id)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_post(post_id).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_post(post_id)),
        }
    }

    /// Replaces text, group and image. `false` if the post does not exist.
    pub async fn update_post(&self, post_id: Id<PostMarker>, content: &PostContent) -> Result<bool> {
        let updated = match &self.backend {
            Backend::Postgres(store) => store.update_post(post_id, content).await?,
            Backend::Memory(tables) => tables.lock().await.update_post(post_id, content)?,
        };

        debug!(post = %post_id, updated, "Updated post");
        Ok(updated)
    }

    /// Deletes the post and its comments. `false` if the post did not exist.
    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let deleted = match &self.backend {
            Backend::Postgres(store) => store.delete_post(post_id).await?,
            Backend::Memory(tables) => tables.lock().await.delete_post(post_id),
        };

        info!(post = %post_id, deleted, "Deleted post");
        Ok(deleted)
    }

    pub async fn count_feed(&self, scope: FeedScope) -> Result<usize> {
        match &self.backend {
            Backend::Postgres(store) => store.count_feed(scope).await,
            Backend::Memory(tables) => Ok(tables.lock().await.count_feed(scope)),
        }
    }

    /// One page of the posts in `scope`, newest first.
    pub async fn fetch_feed(
        &self,
        scope: FeedScope,
        paginator: Paginator,
        requested_page: i64,
    ) -> Result<Page<Post>> {
        let page = match &self.backend {
            Backend::Postgres(store) => store.fetch_feed(scope, paginator, requested_page).await?,
            Backend::Memory(tables) => {
                tables
                    .lock()
                    .await
                    .fetch_feed(scope, paginator, requested_page)
            }
        };

        debug!(
            ?scope,
            requested_page,
            page = page.number,
            num_pages = page.num_pages,
            "Assembled feed page"
        );
        Ok(page)
    }

    pub async fn create_comment(&self, comment: &CreateComment) -> Result<Id<CommentMarker>> {
        let now = UtcDateTime::now();
        let id = self.next_id(now).await?;
        match &self.backend {
            Backend::Postgres(store) => store.create_comment(id, comment, now).await?,
            Backend::Memory(tables) => tables.lock().await.create_comment(id, comment, now)?,
        }

        info!(comment = %id, post = %comment.post, author = %comment.author, "Created comment");
        Ok(id)
    }

    /// Comments under a post, oldest first.
    pub async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        match &self.backend {
            Backend::Postgres(store) => store.fetch_comments(post_id).await,
            Backend::Memory(tables) => Ok(tables.lock().await.fetch_comments(post_id)),
        }
    }

    /// Creates the follow pair if it is absent. Returns whether a row was added.
    pub async fn follow(&self, follow: Follow) -> Result<bool> {
        let created = match &self.backend {
            Backend::Postgres(store) => store.follow(follow).await?,
            Backend::Memory(tables) => tables.lock().await.follow(follow)?,
        };

        debug!(user = %follow.user, author = %follow.author, created, "Follow");
        Ok(created)
    }

    /// Removes the follow pair if present. Returns whether a row was removed.
    pub async fn unfollow(&self, follow: Follow) -> Result<bool> {
        let removed = match &self.backend {
            Backend::Postgres(store) => store.unfollow(follow).await?,
            Backend::Memory(tables) => tables.lock().await.unfollow(follow),
        };

        debug!(user = %follow.user, author = %follow.author, removed, "Unfollow");
        Ok(removed)
    }

    pub async fn is_following(&self, follow: Follow) -> Result<bool> {
        match &self.backend {
            Backend::Postgres(store) => store.is_following(follow).await,
            Backend::Memory(tables) => Ok(tables.lock().await.is_following(follow)),
        }
    }

    /// Number of authors `user` follows.
    pub async fn count_following(&self, user: Id<UserMarker>) -> Result<usize> {
        match &self.backend {
            Backend::Postgres(store) => store.count_following(user).await,
            Backend::Memory(tables) => Ok(tables.lock().await.count_following(user)),
        }
    }

    /// Number of users following `author`.
    pub async fn count_followers(&self, author: Id<UserMarker>) -> Result<usize> {
        match &self.backend {
            Backend::Postgres(store) => store.count_followers(author).await,
            Backend::Memory(tables) => Ok(tables.lock().await.count_followers(author)),
        }
    }
}
