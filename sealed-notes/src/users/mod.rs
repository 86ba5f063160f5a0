use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use rusqlite::{named_params, Row};
use uuid::Uuid;

use crate::db::{self, DB};

pub type UserId = Uuid;

#[derive(Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub access_token: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("access_token", &"[redacted]")
            .finish()
    }
}

impl<'a> TryFrom<&Row<'a>> for User {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'a>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            access_token: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

/// Creates the user or re-issues the token of an existing one.
/// Any previously issued token stops resolving.
pub async fn issue_access_token(db: DB, email: String) -> db::Result<User> {
    let access_token = new_access_token();

    let user = db
        .call(move |conn| {
            conn.query_row(
                r#"INSERT INTO users (email, access_token) VALUES (:email, :access_token)
                    ON CONFLICT(email) DO UPDATE SET access_token = :access_token, updated_at = :now
                    RETURNING id, email, access_token, created_at, updated_at"#,
                named_params! {
                    ":email": email,
                    ":access_token": access_token,
                    ":now": chrono::Utc::now(),
                },
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await?;

    Ok(user)
}

/// Identity lookup for a bearer token. Unknown tokens resolve to `None`.
pub async fn find_one_by_access_token(db: DB, access_token: String) -> db::Result<Option<User>> {
    let user = db
        .call(move |conn| {
            conn.query_row(
                "SELECT id, email, access_token, created_at, updated_at FROM users WHERE access_token = ?",
                [access_token],
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await
        .map_err(db::Error::from);

    match user {
        Ok(user) => Ok(Some(user)),
        Err(db::Error::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

fn new_access_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
