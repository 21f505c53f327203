use crate::server::{
    routes::auth::{LoginPath, SignupPath},
    templates::{field_errors, layout, non_field_errors},
};
use maud::{Markup, html};
use percent_encoding::utf8_percent_encode;
use quill_common::{
    form::{FormErrors, LoginForm, SignupForm},
    model::user::User,
};

fn login_action(next: Option<&str>) -> String {
    let path = LoginPath().to_string();
    match next {
        Some(next) => format!(
            "{path}?next={}",
            utf8_percent_encode(next, crate::server::NEXT_SET)
        ),
        None => path,
    }
}

pub fn signup(viewer: Option<&User>, values: &SignupForm, errors: &FormErrors) -> Markup {
    let content = html! {
        h1 { "Sign up" }
        form method="post" action=(SignupPath().to_string()) {
            (non_field_errors(errors))
            p {
                label for="id_first_name" { "First name" }
                input #id_first_name type="text" name="first_name" value=(values.first_name);
            }
            p {
                label for="id_last_name" { "Last name" }
                input #id_last_name type="text" name="last_name" value=(values.last_name);
            }
            p {
                label for="id_username" { "Username" }
                input #id_username type="text" name="username" value=(values.username) required;
                (field_errors(errors, "username"))
            }
            p {
                label for="id_password1" { "Password" }
                input #id_password1 type="password" name="password1" required;
                (field_errors(errors, "password1"))
            }
            p {
                label for="id_password2" { "Password confirmation" }
                input #id_password2 type="password" name="password2" required;
                (field_errors(errors, "password2"))
            }
            button type="submit" { "Sign up" }
        }
    };
    layout("Sign up", viewer, content)
}

pub fn login(
    viewer: Option<&User>,
    values: &LoginForm,
    errors: &FormErrors,
    next: Option<&str>,
) -> Markup {
    let content = html! {
        h1 { "Log in" }
        form method="post" action=(login_action(next)) {
            (non_field_errors(errors))
            p {
                label for="id_username" { "Username" }
                input #id_username type="text" name="username" value=(values.username) required;
                (field_errors(errors, "username"))
            }
            p {
                label for="id_password" { "Password" }
                input #id_password type="password" name="password" required;
                (field_errors(errors, "password"))
            }
            button type="submit" { "Log in" }
        }
        p { "No account yet? " a href=(SignupPath().to_string()) { "Sign up" } }
    };
    layout("Log in", viewer, content)
}

pub fn logged_out() -> Markup {
    let content = html! {
        h1 { "Logged out" }
        p { "You have been logged out. " a href=(LoginPath().to_string()) { "Log in again" } }
    };
    layout("Logged out", None, content)
}
