use crate::server::templates::layout;
use maud::{Markup, html};
use quill_common::model::user::User;

pub fn author(viewer: Option<&User>) -> Markup {
    let content = html! {
        h1 { "About the author" }
        p {
            "Quill is a small blogging site: write posts, file them into groups, "
            "comment on what others write and follow the authors you like."
        }
    };
    layout("About the author", viewer, content)
}

pub fn tech(viewer: Option<&User>) -> Markup {
    let content = html! {
        h1 { "Technologies" }
        ul {
            li { "Rust with axum and tokio for the web server" }
            li { "PostgreSQL through sqlx for storage" }
            li { "maud for server-side HTML" }
            li { "argon2 for passwords and session tokens" }
        }
    };
    layout("Technologies", viewer, content)
}
