use std::path::Path;

use bytes::Bytes;
use tracing::{info, warn};

use crate::{
    accounts::{
        dto::present,
        services::{find_user, USERNAME_REQUIRED},
    },
    error::AppError,
    state::AppState,
    storage::{is_safe_key, key_from_public_url},
};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

pub async fn upload_picture(
    st: &AppState,
    username: Option<String>,
    file: Option<UploadItem>,
) -> Result<String, AppError> {
    const ON_ERROR: &str = "Failed to save picture to database";

    let username = present(username).ok_or_else(|| AppError::validation(USERNAME_REQUIRED))?;
    let file = file
        .filter(|f| !f.body.is_empty())
        .ok_or_else(|| AppError::validation("No file uploaded"))?;
    if !file.content_type.starts_with("image/") {
        warn!(%username, content_type = %file.content_type, "rejected non-image upload");
        return Err(AppError::validation("Only image files are allowed"));
    }
    if file.body.len() > st.config.max_picture_bytes {
        warn!(%username, bytes = file.body.len(), "rejected oversized upload");
        return Err(too_large());
    }

    let user = find_user(st, &username, ON_ERROR).await?;

    let key = format!(
        "{}{}",
        user.username,
        picture_extension(file.file_name.as_deref(), &file.content_type)
    );
    if !is_safe_key(&key) {
        return Err(AppError::validation("Invalid username"));
    }

    st.storage
        .put_object(&key, file.body, &file.content_type)
        .await
        .map_err(AppError::store("Failed to save picture"))?;

    let url = st.storage.public_url(&key);
    st.users
        .set_profile_picture(&user.username, Some(&url))
        .await
        .map_err(AppError::store(ON_ERROR))?;

    // A new extension means a new file name; drop the one it replaces.
    if let Some(old_key) = user
        .profile_picture
        .as_deref()
        .filter(|old| *old != url)
        .and_then(key_from_public_url)
    {
        if let Err(e) = st.storage.delete_object(old_key).await {
            warn!(error = ?e, %username, old_key, "failed to delete previous picture");
        }
    }

    info!(%username, %url, "profile picture updated");
    Ok(url)
}

pub async fn remove_picture(st: &AppState, username: Option<String>) -> Result<(), AppError> {
    const ON_ERROR: &str = "Failed to remove picture";

    let username = present(username).ok_or_else(|| AppError::validation(USERNAME_REQUIRED))?;
    let user = find_user(st, &username, ON_ERROR).await?;

    if let Some(key) = user.profile_picture.as_deref().and_then(key_from_public_url) {
        match st.storage.delete_object(key).await {
            Ok(true) => {}
            Ok(false) => warn!(%username, key, "picture file already missing"),
            Err(e) => warn!(error = ?e, %username, key, "failed to delete picture file"),
        }
    }

    st.users
        .set_profile_picture(&user.username, None)
        .await
        .map_err(AppError::store(ON_ERROR))?;

    info!(%username, "profile picture removed");
    Ok(())
}

pub(crate) fn too_large() -> AppError {
    AppError::validation("File too large (max 2 MB)")
}

/// Lower-cased extension of the uploaded name, falling back to the MIME type.
fn picture_extension(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| IMAGE_EXTENSIONS.contains(&e.as_str()));
    match from_name.or_else(|| ext_from_mime(content_type).map(str::to_string)) {
        Some(ext) => format!(".{}", ext),
        None => String::new(),
    }
}

/// Name extensions kept as-is; anything else falls back to the MIME type.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "bmp", "avif"];

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{dto::RegisterRequest, services::register};

    async fn state_with_jane(dir: &Path) -> AppState {
        let st = AppState::fake(dir).await;
        register(
            &st,
            RegisterRequest {
                fullname: Some("Jane Doe".into()),
                email: Some("jane@x.edu".into()),
                username: Some("jane".into()),
                password: Some("secret1".into()),
                confirm_password: Some("secret1".into()),
            },
        )
        .await
        .unwrap();
        st
    }

    fn png(name: &str) -> UploadItem {
        UploadItem {
            body: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake"),
            content_type: "image/png".into(),
            file_name: Some(name.into()),
        }
    }

    #[test]
    fn test_picture_extension() {
        assert_eq!(picture_extension(Some("Me.PNG"), "image/png"), ".png");
        assert_eq!(picture_extension(Some("photo"), "image/jpeg"), ".jpg");
        assert_eq!(picture_extension(None, "image/webp"), ".webp");
        assert_eq!(picture_extension(Some("x.p/ng"), "image/bmp"), "");
        assert_eq!(picture_extension(Some("photo"), "image/x-unknown"), "");
        assert_eq!(picture_extension(Some("me.jpeg"), "image/jpeg"), ".jpeg");
    }

    #[test]
    fn non_image_name_extension_falls_back_to_mime() {
        assert_eq!(picture_extension(Some("x.html"), "image/png"), ".png");
        assert_eq!(picture_extension(Some("x.svg"), "image/jpeg"), ".jpg");
        assert_eq!(picture_extension(Some("x.exe"), "image/x-unknown"), "");
    }

    #[tokio::test]
    async fn upload_sets_path_visible_in_store() {
        let dir = tempfile::tempdir().unwrap();
        let st = state_with_jane(dir.path()).await;

        let url = upload_picture(&st, Some("jane".into()), Some(png("me.png")))
            .await
            .expect("upload");
        assert_eq!(url, "/uploads/profiles/jane.png");
        assert!(st.storage.exists("jane.png").await.unwrap());

        let user = st.users.find_by_username("jane").await.unwrap().unwrap();
        assert_eq!(user.profile_picture.as_deref(), Some("/uploads/profiles/jane.png"));
    }

    #[tokio::test]
    async fn non_image_upload_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let st = state_with_jane(dir.path()).await;

        let file = UploadItem {
            body: Bytes::from_static(b"%PDF-1.7"),
            content_type: "application/pdf".into(),
            file_name: Some("cv.pdf".into()),
        };
        let err = upload_picture(&st, Some("jane".into()), Some(file)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Only image files are allowed"));
        assert!(!st.storage.exists("jane.pdf").await.unwrap());
        let user = st.users.find_by_username("jane").await.unwrap().unwrap();
        assert!(user.profile_picture.is_none());
    }

    #[tokio::test]
    async fn oversized_and_missing_uploads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let st = state_with_jane(dir.path()).await;

        let big = UploadItem {
            body: Bytes::from(vec![0u8; st.config.max_picture_bytes + 1]),
            content_type: "image/png".into(),
            file_name: Some("big.png".into()),
        };
        let err = upload_picture(&st, Some("jane".into()), Some(big)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("too large")));

        let err = upload_picture(&st, Some("jane".into()), None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "No file uploaded"));

        let err = upload_picture(&st, None, Some(png("a.png"))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == USERNAME_REQUIRED));
    }

    #[tokio::test]
    async fn upload_for_unknown_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let st = AppState::fake(dir.path()).await;
        let err = upload_picture(&st, Some("ghost".into()), Some(png("a.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!st.storage.exists("ghost.png").await.unwrap());
    }

    #[tokio::test]
    async fn reupload_with_new_extension_leaves_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let st = state_with_jane(dir.path()).await;

        upload_picture(&st, Some("jane".into()), Some(png("a.png"))).await.unwrap();
        let jpeg = UploadItem {
            body: Bytes::from_static(b"\xff\xd8\xff"),
            content_type: "image/jpeg".into(),
            file_name: Some("b.JPG".into()),
        };
        let url = upload_picture(&st, Some("jane".into()), Some(jpeg)).await.unwrap();

        assert_eq!(url, "/uploads/profiles/jane.jpg");
        assert!(st.storage.exists("jane.jpg").await.unwrap());
        assert!(!st.storage.exists("jane.png").await.unwrap());
    }

    #[tokio::test]
    async fn remove_clears_pointer_even_when_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let st = state_with_jane(dir.path()).await;
        upload_picture(&st, Some("jane".into()), Some(png("a.png"))).await.unwrap();

        st.storage.delete_object("jane.png").await.unwrap();
        remove_picture(&st, Some("jane".into())).await.expect("remove");
        remove_picture(&st, Some("jane".into())).await.expect("remove again");

        let user = st.users.find_by_username("jane").await.unwrap().unwrap();
        assert!(user.profile_picture.is_none());
    }

    #[tokio::test]
    async fn remove_deletes_file_and_checks_user() {
        let dir = tempfile::tempdir().unwrap();
        let st = state_with_jane(dir.path()).await;
        upload_picture(&st, Some("jane".into()), Some(png("a.png"))).await.unwrap();

        remove_picture(&st, Some("jane".into())).await.unwrap();
        assert!(!st.storage.exists("jane.png").await.unwrap());

        let err = remove_picture(&st, Some("ghost".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = remove_picture(&st, Some(" ".into())).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
