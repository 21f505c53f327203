use crate::server::{Result, ServerError};
use quill_common::form::{ImageKind, ImageUpload};
use std::path::Path;
use tracing::{info, warn};

const POST_IMAGE_DIR: &str = "posts";

/// Writes an uploaded image below `media_root` and returns its path relative
/// to it, which is also its path under `/media/`.
pub async fn store_post_image(
    media_root: &Path,
    upload: &ImageUpload,
    kind: ImageKind,
) -> Result<String> {
    let file_name = format!("{:016x}.{}", rand::random::<u64>(), kind.extension());
    let directory = media_root.join(POST_IMAGE_DIR);

    tokio::fs::create_dir_all(&directory)
        .await
        .map_err(ServerError::Media)?;
    tokio::fs::write(directory.join(&file_name), &upload.bytes)
        .await
        .map_err(ServerError::Media)?;

    let relative = format!("{POST_IMAGE_DIR}/{file_name}");
    info!(
        path = %relative,
        uploaded_as = %upload.file_name,
        bytes = upload.bytes.len(),
        "Stored post image"
    );
    Ok(relative)
}

/// Removes an image written by [`store_post_image`] whose post was never
/// saved. Failures are logged and otherwise ignored.
pub async fn discard_post_image(media_root: &Path, relative: &str) {
    match tokio::fs::remove_file(media_root.join(relative)).await {
        Ok(()) => info!(path = %relative, "Discarded post image"),
        Err(error) => warn!(path = %relative, %error, "Could not discard post image"),
    }
}

#[cfg(test)]
mod tests {
    use crate::server::media::{discard_post_image, store_post_image};
    use quill_common::form::{ImageKind, ImageUpload};

    #[tokio::test]
    async fn images_land_in_the_posts_directory() {
        let root = std::env::temp_dir().join(format!("quill-media-{:x}", rand::random::<u64>()));
        let upload = ImageUpload {
            file_name: "cat.gif".to_owned(),
            bytes: b"GIF89a-not-really".to_vec(),
        };

        let relative = store_post_image(&root, &upload, ImageKind::Gif).await.unwrap();

        assert!(relative.starts_with("posts/"));
        assert!(relative.ends_with(".gif"));
        assert_eq!(tokio::fs::read(root.join(&relative)).await.unwrap(), upload.bytes);

        tokio::fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn discarded_images_are_removed() {
        let root = std::env::temp_dir().join(format!("quill-media-{:x}", rand::random::<u64>()));
        let upload = ImageUpload {
            file_name: "cat.png".to_owned(),
            bytes: b"\x89PNG\r\n\x1a\nrest".to_vec(),
        };

        let relative = store_post_image(&root, &upload, ImageKind::Png).await.unwrap();
        discard_post_image(&root, &relative).await;
        assert!(!root.join(&relative).exists());

        // A second discard only logs.
        discard_post_image(&root, &relative).await;

        tokio::fs::remove_dir_all(root).await.unwrap();
    }
}
