use crate::{
    config::Config,
    server::{
        ServerState,
        auth::{SESSION_COOKIE, start_session},
        router,
    },
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, header},
    response::Response,
};
use quill_common::{
    model::{
        Id,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{PostContent, PostMarker},
        user::{CreateUser, User, Username},
    },
    snowflake::{ProcessId, WorkerId},
};
use quill_db::client::DbClient;
use std::net::{IpAddr, Ipv4Addr};
use tower::ServiceExt;

pub fn test_config() -> Config {
    Config {
        server_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        server_port: 0,
        database_url: None,
        media_root: std::env::temp_dir().join(format!("quill-test-{:016x}", rand::random::<u64>())),
        posts_per_page: 10,
        index_cache_seconds: 20,
        session_ttl_seconds: 3600,
        worker_id: 0,
        process_id: 0,
    }
}

pub struct TestApp {
    pub state: ServerState,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let db = DbClient::in_memory(WorkerId::default(), ProcessId::default());
        let state = ServerState::new(db, test_config());

        Self {
            router: router(state.clone()),
            state,
        }
    }

    pub fn db(&self) -> &DbClient {
        &self.state.db_client
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::get(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        self.request(request.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response {
        let mut request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        self.request(request.body(Body::from(body.to_owned())).unwrap())
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        cookie: Option<&str>,
        body: Multipart,
    ) -> Response {
        let mut request = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", Multipart::BOUNDARY),
        );
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        self.request(request.body(Body::from(body.finish())).unwrap())
            .await
    }

    /// A user with an open session; returns the `Cookie` header value for it.
    pub async fn user(&self, username: &str) -> (User, String) {
        let user = self
            .db()
            .create_user(&CreateUser {
                username: Username::new(username.to_owned()).unwrap(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: String::new(),
            })
            .await
            .unwrap();
        let token = start_session(self.db(), user.id, None).await.unwrap();

        let cookie = format!("{SESSION_COOKIE}={}", token.as_token_str());
        (user, cookie)
    }

    pub async fn group(&self, slug: &str) -> Group {
        self.db()
            .create_group(&CreateGroup {
                title: format!("Group {slug}"),
                slug: GroupSlug::new(slug.to_owned()).unwrap(),
                description: format!("All about {slug}"),
            })
            .await
            .unwrap()
    }

    pub async fn post(
        &self,
        author: &User,
        text: &str,
        group: Option<Id<GroupMarker>>,
    ) -> Id<PostMarker> {
        let content = PostContent {
            text: text.to_owned(),
            group,
            image: None,
        };
        self.db().create_post(author.id, &content).await.unwrap()
    }
}

/// A hand-assembled `multipart/form-data` body.
#[derive(Default)]
pub struct Multipart {
    body: Vec<u8>,
}

impl Multipart {
    const BOUNDARY: &str = "quill-test-boundary";

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                Self::BOUNDARY
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                Self::BOUNDARY
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", Self::BOUNDARY).as_bytes());
        self.body
    }
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
