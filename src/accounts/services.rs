use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    accounts::{
        dto::{
            present, present_raw, ChangePasswordRequest, LoginRequest, Profile, PublicUser,
            RegisterRequest,
        },
        password::{hash_password, is_long_enough, verify_password, MIN_PASSWORD_LEN},
        repo::CreateUserError,
        repo_types::{NewUser, User},
    },
    error::AppError,
    state::AppState,
};

pub(crate) const USER_NOT_FOUND: &str = "User not found";
pub(crate) const USERNAME_REQUIRED: &str = "Username required";

fn too_short() -> AppError {
    AppError::validation(format!(
        "Password must be at least {} characters",
        MIN_PASSWORD_LEN
    ))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Usernames double as picture file names, so they stay filesystem-safe.
pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9_.-]{0,63}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub(crate) async fn find_user(
    st: &AppState,
    username: &str,
    on_error: &'static str,
) -> Result<User, AppError> {
    st.users
        .find_by_username(username)
        .await
        .map_err(AppError::store(on_error))?
        .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.into()))
}

pub async fn register(st: &AppState, req: RegisterRequest) -> Result<(), AppError> {
    const ON_ERROR: &str = "Server error during registration";

    let (Some(fullname), Some(email), Some(username), Some(password), Some(confirm)) = (
        present(req.fullname),
        present(req.email).map(|e| e.to_lowercase()),
        present(req.username),
        present_raw(req.password),
        present_raw(req.confirm_password),
    ) else {
        return Err(AppError::validation("All fields required"));
    };

    if password != confirm {
        return Err(AppError::validation("Passwords do not match"));
    }
    if !is_long_enough(&password) {
        return Err(too_short());
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    if !is_valid_username(&username) {
        warn!(%username, "invalid username");
        return Err(AppError::validation(
            "Username may only contain letters, digits, '.', '_' and '-'",
        ));
    }

    // Fast path for the common case; the unique constraints below are authoritative.
    if st.users.username_exists(&username).await.map_err(AppError::store(ON_ERROR))? {
        warn!(%username, "username already exists");
        return Err(AppError::Conflict("Username already exists".into()));
    }
    if st.users.email_exists(&email).await.map_err(AppError::store(ON_ERROR))? {
        warn!(%email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&password).map_err(AppError::store(ON_ERROR))?;

    let user = st
        .users
        .create(NewUser {
            fullname: &fullname,
            username: &username,
            email: &email,
            password_hash: &password_hash,
        })
        .await
        .map_err(|e| match e {
            CreateUserError::DuplicateUsername => AppError::Conflict("Username already exists".into()),
            CreateUserError::DuplicateEmail => AppError::Conflict("Email already registered".into()),
            CreateUserError::Other(source) => AppError::store(ON_ERROR)(source),
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(())
}

pub async fn login(st: &AppState, req: LoginRequest) -> Result<PublicUser, AppError> {
    const ON_ERROR: &str = "Login failed";

    let (Some(username), Some(password)) = (present(req.username), present_raw(req.password)) else {
        return Err(AppError::validation("Username and password required"));
    };

    let user = find_user(st, &username, ON_ERROR).await.map_err(|e| {
        if matches!(e, AppError::NotFound(_)) {
            warn!(%username, "login unknown username");
        }
        e
    })?;

    if !verify_password(&password, &user.password_hash).map_err(AppError::store(ON_ERROR))? {
        warn!(%username, user_id = %user.id, "login invalid password");
        return Err(AppError::Auth("Wrong password".into()));
    }

    info!(user_id = %user.id, %username, "user logged in");
    Ok(user.into())
}

pub async fn get_profile(st: &AppState, username: Option<String>) -> Result<Profile, AppError> {
    let username = present(username).ok_or_else(|| AppError::validation(USERNAME_REQUIRED))?;
    let user = find_user(st, &username, "Server error").await?;
    Ok(user.into())
}

pub async fn change_password(st: &AppState, req: ChangePasswordRequest) -> Result<(), AppError> {
    const ON_ERROR: &str = "Server error";

    let (Some(username), Some(current), Some(new)) = (
        present(req.username),
        present_raw(req.current_password),
        present_raw(req.new_password),
    ) else {
        return Err(AppError::validation("All fields required"));
    };

    if !is_long_enough(&new) {
        return Err(too_short());
    }

    let user = find_user(st, &username, ON_ERROR).await?;

    if !verify_password(&current, &user.password_hash).map_err(AppError::store(ON_ERROR))? {
        warn!(%username, user_id = %user.id, "change password with wrong current password");
        return Err(AppError::Auth("Current password is incorrect".into()));
    }

    let hash = hash_password(&new).map_err(AppError::store(ON_ERROR))?;
    let updated = st
        .users
        .update_password_hash(&username, &hash)
        .await
        .map_err(AppError::store(ON_ERROR))?;
    if !updated {
        return Err(AppError::NotFound(USER_NOT_FOUND.into()));
    }

    info!(user_id = %user.id, %username, "password changed");
    Ok(())
}
