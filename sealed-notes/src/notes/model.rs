use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::UserId;

pub type NoteId = Uuid;

/// A note as its owner sees it. Never persisted in this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Note {
    pub id: NoteId,
    pub owner_id: UserId,
    pub title: String,
    pub body: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A `notes` row. `title` and `body` hold field envelopes.
#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub id: NoteId,
    pub owner_id: UserId,
    pub title: String,
    pub body: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// Full replacement: an omitted `body` clears the stored one.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateNote {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteNoteResponse {
    pub success: bool,
}

#[derive(Debug, Default)]
pub struct NoteListing {
    pub notes: Vec<Note>,
    /// Rows left out because their envelopes failed verification.
    pub unreadable: Vec<NoteId>,
}
