use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const USERNAME_MAX_LEN: usize = 150;

/// First path segments owned by other routes; a user with one of these names
/// would have an unreachable profile.
pub const RESERVED_USERNAMES: &[&str] = &["about", "auth", "follow", "group", "media", "new"];

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    /// Full name if one is set, the username otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full_name = format!("{} {}", self.first_name, self.last_name);
        let full_name = full_name.trim();
        if full_name.is_empty() {
            self.username.get().to_owned()
        } else {
            full_name.to_owned()
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateUser {
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0}")]
pub struct InvalidUsernameError(String);

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')
}

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let length = username.chars().count();
        if (1..=USERNAME_MAX_LEN).contains(&length)
            && username.chars().all(is_username_char)
            && !RESERVED_USERNAMES.contains(&username.as_str())
        {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{User, Username};

    #[test]
    fn username_rules() {
        assert!(Username::new("StasBasov".to_owned()).is_ok());
        assert!(Username::new("a.b@c+d-e_f".to_owned()).is_ok());
        assert!(Username::new("Андрей".to_owned()).is_ok());

        assert!(Username::new(String::new()).is_err());
        assert!(Username::new("Lars von Trier".to_owned()).is_err());
        assert!(Username::new("a/b".to_owned()).is_err());
        assert!(Username::new("x".repeat(151)).is_err());
        assert!(Username::new("new".to_owned()).is_err());
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut user = User {
            username: Username::new("jdarc".to_owned()).unwrap(),
            ..User::default()
        };
        assert_eq!(user.display_name(), "jdarc");

        user.first_name = "Jehanne".to_owned();
        user.last_name = "Darc".to_owned();
        assert_eq!(user.display_name(), "Jehanne Darc");
    }
}
