use crate::server::ServerError;
use axum::{
    Form as AxumForm,
    extract::{FromRequest, FromRequestParts, Multipart, Query as AxumQuery, Request},
    http::header::CONTENT_TYPE,
};
use quill_common::form::{ImageUpload, PostForm};

/// `application/x-www-form-urlencoded` bodies, rejected as [`ServerError`].
#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumForm), rejection(ServerError))]
pub struct Form<T>(pub T);

/// Query strings, rejected as [`ServerError`].
#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);

/// A post submission, either multipart (possibly with an image) or urlencoded.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PostSubmission(pub PostForm);

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

impl<S> FromRequest<S> for PostSubmission
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&request) {
            let Form(form) = Form::<PostForm>::from_request(request, state).await?;
            return Ok(Self(form));
        }

        let mut multipart = Multipart::from_request(request, state).await?;
        let mut form = PostForm::default();

        while let Some(field) = multipart.next_field().await? {
            match field.name() {
                Some("text") => form.text = field.text().await?,
                Some("group") => form.group = field.text().await?,
                Some("image-clear") => form.image_clear = Some(field.text().await?),
                Some("image") => {
                    let file_name = field.file_name().unwrap_or_default().to_owned();
                    let bytes = field.bytes().await?.to_vec();
                    if !file_name.is_empty() || !bytes.is_empty() {
                        form.image = Some(ImageUpload { file_name, bytes });
                    }
                }
                _ => {}
            }
        }

        Ok(Self(form))
    }
}
