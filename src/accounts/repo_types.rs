use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,           // Argon2 PHC string, never serialized
    pub profile_picture: Option<String>, // public URL under /uploads/profiles
    pub created_at: OffsetDateTime,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("profile_picture", &self.profile_picture)
            .finish_non_exhaustive()
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub fullname: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}
