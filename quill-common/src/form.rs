//! Submission forms and their validation.
//!
//! A form is validated as a whole; any failure returns [`FormErrors`] keyed by
//! field so the page can be re-rendered next to the offending inputs. Nothing
//! here touches storage: checks that need it (does the group exist, is the
//! username taken) are added by the caller through [`FormErrors::add`].

use crate::model::{
    Id,
    group::GroupMarker,
    user::{USERNAME_MAX_LEN, Username},
};
use serde::Deserialize;
use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const PASSWORD_TOO_SHORT: &str = "This password is too short. It must contain at least 8 characters.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";
pub const INVALID_LOGIN: &str = "Please enter a correct username and password.";
pub const IMAGE_CONTRADICTION: &str = "Please either submit a file or check the clear checkbox, not both.";

/// Key for errors that belong to the form rather than to one field.
pub const NON_FIELD_ERRORS: &str = "__all__";

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn non_field(&self) -> &[String] {
        self.field(NON_FIELD_ERRORS)
    }

    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        !self.field(field).is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(value)` if no error has been recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut form_errors = FormErrors::new();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), ToString::to_string);
                form_errors.add(&field, message);
            }
        }
        form_errors
    }
}

fn validate_into(form: &impl Validate) -> FormErrors {
    form.validate().map_or_else(FormErrors::from, |()| FormErrors::new())
}

/// An uploaded file as received from a multipart body.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Image formats recognised by their leading bytes.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ImageKind {
    Gif,
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl ImageKind {
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else if bytes.starts_with(b"BM") && bytes.len() > 14 {
            Some(Self::Bmp)
        } else {
            None
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
        }
    }
}

/// Raw post submission. `group` is the selected option value, empty for none.
/// `image_clear` is the "clear" checkbox next to an existing image; any value
/// counts as checked.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Validate)]
pub struct PostForm {
    #[validate(length(min = 1, message = "This field is required."))]
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: String,
    #[serde(skip)]
    pub image: Option<ImageUpload>,
    #[serde(default, rename = "image-clear")]
    pub image_clear: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanPost {
    pub text: String,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<(ImageUpload, ImageKind)>,
    /// Drop the current image. Never set together with `image`.
    pub clear_image: bool,
}

impl PostForm {
    /// Trims the text and checks everything that does not need storage.
    pub fn clean(mut self) -> Result<CleanPost, FormErrors> {
        self.text = self.text.trim().to_owned();
        let mut errors = validate_into(&self);

        let group = match self.group.trim() {
            "" => None,
            raw => match raw.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("group", INVALID_CHOICE);
                    None
                }
            },
        };

        let image = match self.image {
            None => None,
            Some(upload) if upload.bytes.is_empty() && upload.file_name.is_empty() => None,
            Some(upload) => match ImageKind::sniff(&upload.bytes) {
                Some(kind) => Some((upload, kind)),
                None => {
                    errors.add("image", INVALID_IMAGE);
                    None
                }
            },
        };

        let clear_image = self.image_clear.is_some();
        if clear_image && image.is_some() {
            errors.add("image", IMAGE_CONTRADICTION);
        }

        errors.into_result(CleanPost {
            text: self.text,
            group,
            image,
            clear_image,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Validate)]
pub struct CommentForm {
    #[validate(length(min = 1, message = "This field is required."))]
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn clean(mut self) -> Result<String, FormErrors> {
        self.text = self.text.trim().to_owned();
        validate_into(&self).into_result(self.text)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Validate)]
pub struct SignupForm {
    #[validate(length(min = 1, message = "This field is required."))]
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[validate(length(
        min = 8,
        message = "This password is too short. It must contain at least 8 characters."
    ))]
    #[serde(default)]
    pub password1: String,
    #[validate(must_match(other = "password1", message = "The two password fields didn't match."))]
    #[serde(default)]
    pub password2: String,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanSignup {
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl SignupForm {
    pub fn clean(mut self) -> Result<CleanSignup, FormErrors> {
        self.username = self.username.trim().to_owned();
        self.first_name = self.first_name.trim().to_owned();
        self.last_name = self.last_name.trim().to_owned();
        let mut errors = validate_into(&self);

        let username = if errors.has("username") {
            None
        } else if self.username.chars().count() > USERNAME_MAX_LEN {
            errors.add(
                "username",
                format!("Ensure this value has at most {USERNAME_MAX_LEN} characters."),
            );
            None
        } else {
            Username::new(self.username)
                .inspect_err(|_| errors.add("username", INVALID_USERNAME))
                .ok()
        };

        match username {
            Some(username) if errors.is_empty() => Ok(CleanSignup {
                username,
                first_name: self.first_name,
                last_name: self.last_name,
                password: self.password1,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "This field is required."))]
    #[serde(default)]
    pub username: String,
    #[validate(length(min = 1, message = "This field is required."))]
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn clean(mut self) -> Result<(String, String), FormErrors> {
        self.username = self.username.trim().to_owned();
        validate_into(&self).into_result((self.username, self.password))
    }
}
