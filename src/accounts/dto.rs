use serde::{Deserialize, Serialize};

use crate::accounts::repo_types::User;

/// Request body for registration. Missing keys deserialize as `None`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileQuery {
    pub username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordRequest {
    pub username: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// `{ "success": true }`
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse<T> {
    pub success: bool,
    pub user: T,
}

impl<T> UserResponse<T> {
    pub fn ok(user: T) -> Self {
        Self { success: true, user }
    }
}

/// What login returns about the user.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub fullname: String,
    pub username: String,
    pub email: String,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            fullname: u.fullname,
            username: u.username,
            email: u.email,
        }
    }
}

/// What the profile endpoint returns; includes the picture URL.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Profile {
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

impl From<User> for Profile {
    fn from(u: User) -> Self {
        Self {
            fullname: u.fullname,
            username: u.username,
            email: u.email,
            profile_picture: u.profile_picture,
        }
    }
}

/// Trimmed, non-empty value of an optional text field.
pub(crate) fn present(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Non-empty value, kept verbatim. Used for secrets, which are never trimmed.
pub(crate) fn present_raw(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}
