//! HTML pages.
//!
//! Every page goes through [`layout`]. A `viewer` of `None` renders the guest
//! navigation.

use crate::server::routes::{
    about::{AboutAuthorPath, AboutTechPath},
    auth::{LoginPath, LogoutPath, SignupPath},
    posts::{IndexPath, NewPostPath},
    users::{FollowIndexPath, ProfilePath},
};
use maud::{DOCTYPE, Markup, html};
use quill_common::{
    form::{FormErrors, NON_FIELD_ERRORS},
    model::user::User,
    pagination::Page,
};
use time::{
    UtcDateTime,
    format_description::BorrowedFormatItem,
    macros::format_description,
};

pub mod about;
pub mod auth;
pub mod posts;
pub mod users;

const DATE_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[day].[month].[year] [hour]:[minute]");

pub fn layout(title: &str, viewer: Option<&User>, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " · Quill" }
            }
            body {
                header { (navigation(viewer)) }
                main { (content) }
                footer {
                    a href=(AboutAuthorPath().to_string()) { "About the author" }
                    " · "
                    a href=(AboutTechPath().to_string()) { "Technologies" }
                }
            }
        }
    }
}

fn navigation(viewer: Option<&User>) -> Markup {
    html! {
        nav {
            a href=(IndexPath().to_string()) { strong { "Quill" } }
            " "
            a href=(NewPostPath().to_string()) { "New post" }
            " "
            a href=(FollowIndexPath().to_string()) { "Following" }
            " "
            @if let Some(user) = viewer {
                a href=(ProfilePath { username: user.username.get().to_owned() }.to_string()) {
                    (user.display_name())
                }
                " "
                a href=(LogoutPath().to_string()) { "Log out" }
            } @else {
                a href=(LoginPath().to_string()) { "Log in" }
                " "
                a href=(SignupPath().to_string()) { "Sign up" }
            }
        }
    }
}

pub fn format_time(time: UtcDateTime) -> String {
    time.format(DATE_FORMAT).unwrap_or_default()
}

/// Previous/next links for a paged list, rendered only when there is more
/// than one page.
pub fn pagination<T>(page: &Page<T>) -> Markup {
    html! {
        @if page.num_pages > 1 {
            nav.pagination {
                @if let Some(previous) = page.previous_number() {
                    a href="?page=1" { "« first" }
                    " "
                    a href=(format!("?page={previous}")) { "previous" }
                    " "
                }
                span { "Page " (page.number) " of " (page.num_pages) }
                @if let Some(next) = page.next_number() {
                    " "
                    a href=(format!("?page={next}")) { "next" }
                    " "
                    a href=(format!("?page={}", page.num_pages)) { "last »" }
                }
            }
        }
    }
}

pub fn field_errors(errors: &FormErrors, field: &str) -> Markup {
    html! {
        @for message in errors.field(field) {
            p.error { (message) }
        }
    }
}

pub fn non_field_errors(errors: &FormErrors) -> Markup {
    field_errors(errors, NON_FIELD_ERRORS)
}

pub fn not_found(path: &str) -> Markup {
    let content = html! {
        h1 { "Page not found" }
        @if path.is_empty() {
            p { "The requested page does not exist." }
        } @else {
            p { "The page " code { (path) } " does not exist." }
        }
        a href=(IndexPath().to_string()) { "Back to the home page" }
    };
    layout("Not found", None, content)
}

pub fn bad_request() -> Markup {
    let content = html! {
        h1 { "Bad request" }
        p { "The request could not be understood." }
    };
    layout("Bad request", None, content)
}

pub fn server_error() -> Markup {
    let content = html! {
        h1 { "Server error" }
        p { "Something went wrong on our side. Please try again later." }
    };
    layout("Server error", None, content)
}

#[cfg(test)]
mod tests {
    use crate::server::templates::{format_time, not_found, pagination};
    use quill_common::pagination::Paginator;
    use time::macros::utc_datetime;

    #[test]
    fn dates() {
        assert_eq!(format_time(utc_datetime!(2025-06-01 09:05)), "01.06.2025 09:05");
    }

    #[test]
    fn pagination_links() {
        let items: Vec<u32> = (0..25).collect();
        let middle = Paginator::default().paginate(items.clone(), 2);
        let html = pagination(&middle).into_string();

        assert!(html.contains("?page=1"));
        assert!(html.contains("?page=3"));
        assert!(html.contains("Page 2 of 3"));

        let single = Paginator::default().paginate(items[..4].to_vec(), 1);
        assert!(pagination(&single).into_string().is_empty());
    }

    #[test]
    fn not_found_escapes_the_path() {
        let html = not_found("/<script>/").into_string();
        assert!(html.contains("/&lt;script&gt;/"));
    }
}
