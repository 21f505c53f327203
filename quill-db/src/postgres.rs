use crate::{
    client::{DbError, Result},
    record::{
        AuthenticationRecord, CommentRecord, CredentialsRecord, FullPostRecord, GroupRecord,
        UserRecord, to_db_time,
    },
};
use quill_common::{
    feed::FeedScope,
    model::{
        Id,
        auth::{Authentication, SessionTokenHash},
        comment::{Comment, CommentMarker, CreateComment},
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker},
        post::{Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    pagination::{Page, Paginator},
};
use sqlx::{PgPool, Postgres, QueryBuilder, query, query_as, query_scalar};
use time::UtcDateTime;

const FULL_POST_SELECT: &str = "
    SELECT
        posts.post_snowflake,
        posts.text,
        posts.image,
        posts.created_at,
        users.user_snowflake,
        users.username,
        users.first_name,
        users.last_name,
        post_groups.group_snowflake,
        post_groups.title AS group_title,
        post_groups.slug AS group_slug,
        (
            SELECT COUNT(*) FROM posts.comments
            WHERE comments.post_snowflake = posts.post_snowflake
        ) AS comment_count
    FROM
        posts.posts
        JOIN users.users ON users.user_snowflake = posts.user_snowflake
        LEFT JOIN posts.post_groups ON post_groups.group_snowflake = posts.group_snowflake
";

fn map_constraint_violation(err: sqlx::Error) -> DbError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation,
        Some(db_err) if db_err.is_foreign_key_violation() => DbError::MissingReference,
        _ => DbError::Sqlx(err),
    }
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: FeedScope) {
    match scope {
        FeedScope::All => {}
        FeedScope::Group(group) => {
            builder
                .push(" WHERE posts.group_snowflake = ")
                .push_bind(group.to_db());
        }
        FeedScope::Author(author) => {
            builder
                .push(" WHERE posts.user_snowflake = ")
                .push_bind(author.to_db());
        }
        FeedScope::Following(user) => {
            builder
                .push(
                    " WHERE posts.user_snowflake IN \
                    (SELECT author_snowflake FROM users.follows WHERE follows.user_snowflake = ",
                )
                .push_bind(user.to_db())
                .push(")");
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(&self, id: Id<UserMarker>, user: &CreateUser) -> Result<User> {
        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, username, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_snowflake, username, first_name, last_name
            ",
        )
        .bind(id.to_db())
        .bind(user.username.get())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        Ok(record.try_into()?)
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_snowflake, username, first_name, last_name
            FROM users.users
            WHERE user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    pub async fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_snowflake, username, first_name, last_name
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    pub async fn fetch_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT user_snowflake, username, first_name, last_name, password_hash
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        record
            .map(|record| -> Result<(User, String)> {
                Ok((record.user.try_into()?, record.password_hash))
            })
            .transpose()
    }

    pub async fn create_authentication(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO users.authentications
                (token_hash, user_snowflake, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(authentication.token_hash.0.as_slice())
        .bind(authentication.user.to_db())
        .bind(to_db_time(authentication.created_at))
        .bind(
            authentication
                .expires_after
                .map(|duration| duration.whole_seconds()),
        )
        .execute(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        Ok(())
    }

    pub async fn fetch_authentication(
        &self,
        token_hash: &SessionTokenHash,
    ) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT user_snowflake, token_hash, created_at, expires_after_seconds
            FROM users.authentications
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.0.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Authentication::try_from).transpose()?)
    }

    pub async fn delete_authentication(&self, token_hash: &SessionTokenHash) -> Result<bool> {
        let result = query("DELETE FROM users.authentications WHERE token_hash = $1")
            .bind(token_hash.0.as_slice())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_group(&self, id: Id<GroupMarker>, group: &CreateGroup) -> Result<Group> {
        let record = query_as::<_, GroupRecord>(
            "
            INSERT INTO posts.post_groups (group_snowflake, title, slug, description)
            VALUES ($1, $2, $3, $4)
            RETURNING group_snowflake, title, slug, description
            ",
        )
        .bind(id.to_db())
        .bind(&group.title)
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        Ok(record.try_into()?)
    }

    pub async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_snowflake, title, slug, description
            FROM posts.post_groups
            WHERE group_snowflake = $1
            ",
        )
        .bind(group_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Group::try_from).transpose()?)
    }

    pub async fn fetch_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_snowflake, title, slug, description
            FROM posts.post_groups
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Group::try_from).transpose()?)
    }

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT group_snowflake, title, slug, description
            FROM posts.post_groups
            ORDER BY title, group_snowflake
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?)
    }

    pub async fn create_post(
        &self,
        id: Id<PostMarker>,
        author: Id<UserMarker>,
        content: &PostContent,
        created_at: UtcDateTime,
    ) -> Result<()> {
        query(
            "
            INSERT INTO posts.posts
                (post_snowflake, user_snowflake, group_snowflake, text, image, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(id.to_db())
        .bind(author.to_db())
        .bind(content.group.map(Id::to_db))
        .bind(&content.text)
        .bind(content.image.as_deref())
        .bind(to_db_time(created_at))
        .execute(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        Ok(())
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut builder = QueryBuilder::<Postgres>::new(FULL_POST_SELECT);
        builder
            .push(" WHERE posts.post_snowflake = ")
            .push_bind(post_id.to_db());

        let record = builder
            .build_query_as::<FullPostRecord>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    pub async fn update_post(&self, post_id: Id<PostMarker>, content: &PostContent) -> Result<bool> {
        let result = query(
            "
            UPDATE posts.posts
            SET text = $2, group_snowflake = $3, image = $4
            WHERE post_snowflake = $1
            ",
        )
        .bind(post_id.to_db())
        .bind(&content.text)
        .bind(content.group.map(Id::to_db))
        .bind(content.image.as_deref())
        .execute(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.posts WHERE post_snowflake = $1")
            .bind(post_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_feed(&self, scope: FeedScope) -> Result<usize> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts.posts");
        push_scope(&mut builder, scope);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub async fn fetch_feed(
        &self,
        scope: FeedScope,
        paginator: Paginator,
        requested_page: i64,
    ) -> Result<Page<Post>> {
        let total = self.count_feed(scope).await?;
        let window = paginator.window(total, requested_page);

        let mut builder = QueryBuilder::<Postgres>::new(FULL_POST_SELECT);
        push_scope(&mut builder, scope);
        builder
            .push(" ORDER BY posts.created_at DESC, posts.post_snowflake DESC LIMIT ")
            .push_bind(i64::try_from(window.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));

        let records = builder
            .build_query_as::<FullPostRecord>()
            .fetch_all(&self.pool)
            .await?;
        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;

        Ok(Page::from_window(window, posts))
    }

    pub async fn create_comment(
        &self,
        id: Id<CommentMarker>,
        comment: &CreateComment,
        created_at: UtcDateTime,
    ) -> Result<()> {
        query(
            "
            INSERT INTO posts.comments
                (comment_snowflake, post_snowflake, user_snowflake, text, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id.to_db())
        .bind(comment.post.to_db())
        .bind(comment.author.to_db())
        .bind(&comment.text)
        .bind(to_db_time(created_at))
        .execute(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        Ok(())
    }

    pub async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_snowflake,
                comments.post_snowflake,
                comments.text,
                comments.created_at,
                users.user_snowflake,
                users.username,
                users.first_name,
                users.last_name
            FROM
                posts.comments
                JOIN users.users ON users.user_snowflake = comments.user_snowflake
            WHERE
                comments.post_snowflake = $1
            ORDER BY comments.created_at, comments.comment_snowflake
            ",
        )
        .bind(post_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?)
    }

    pub async fn follow(&self, follow: Follow) -> Result<bool> {
        let result = query(
            "
            INSERT INTO users.follows (user_snowflake, author_snowflake)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(follow.user.to_db())
        .bind(follow.author.to_db())
        .execute(&self.pool)
        .await
        .map_err(map_constraint_violation)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn unfollow(&self, follow: Follow) -> Result<bool> {
        let result = query(
            "
            DELETE FROM users.follows
            WHERE user_snowflake = $1 AND author_snowflake = $2
            ",
        )
        .bind(follow.user.to_db())
        .bind(follow.author.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, follow: Follow) -> Result<bool> {
        let exists = query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1 FROM users.follows
                WHERE user_snowflake = $1 AND author_snowflake = $2
            )
            ",
        )
        .bind(follow.user.to_db())
        .bind(follow.author.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    pub async fn count_following(&self, user: Id<UserMarker>) -> Result<usize> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users.follows WHERE user_snowflake = $1",
        )
        .bind(user.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub async fn count_followers(&self, author: Id<UserMarker>) -> Result<usize> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users.follows WHERE author_snowflake = $1",
        )
        .bind(author.to_db())
        .fetch_one(&self.pool)
        .await?;

        Ok(usize::try_from(count).unwrap_or_default())
    }
}
