//! Record-level access to the `notes` table.
//!
//! Everything here works on envelopes only. Every lookup is scoped by
//! `owner_id`, so a note owned by someone else is indistinguishable from a
//! missing one.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use sea_query::{Expr, Iden, Order, Query, SqliteQueryBuilder};
use sea_query_rusqlite::RusqliteBinder;
use uuid::Uuid;

use crate::{
    db::{self, DB},
    users::UserId,
};

use super::{NoteId, NoteRecord};

#[derive(Iden)]
pub enum Notes {
    Table,
    Id,
    OwnerId,
    Title,
    Body,
    CreatedAt,
    UpdatedAt,
}

impl<'a> TryFrom<&Row<'a>> for NoteRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'a>) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

pub async fn insert(
    db: DB,
    owner_id: UserId,
    title: String,
    body: Option<String>,
    now: DateTime<Utc>,
) -> db::Result<NoteRecord> {
    let note_id = Uuid::now_v7();

    db.call(move |conn| {
        conn.query_row(
            r#"INSERT INTO notes (id, owner_id, title, body, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, owner_id, title, body, created_at, updated_at"#,
            params![note_id, owner_id, title, body, now, now],
            |row| NoteRecord::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
}

/// Most recently updated first, ties broken by ascending id.
pub async fn find_by_owner(db: DB, owner_id: UserId) -> db::Result<Vec<NoteRecord>> {
    db.call(move |conn| {
        let (sql, values) = Query::select()
            .columns({
                use Notes::*;
                [Id, OwnerId, Title, Body, CreatedAt, UpdatedAt]
            })
            .from(Notes::Table)
            .and_where(Expr::col(Notes::OwnerId).eq(owner_id))
            .order_by(Notes::UpdatedAt, Order::Desc)
            .order_by(Notes::Id, Order::Asc)
            .build_rusqlite(SqliteQueryBuilder);

        let records = conn
            .prepare(&sql)?
            .query_map(&*values.as_params(), |row| NoteRecord::try_from(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    })
    .await
    .map_err(db::Error::from)
}

pub async fn find_owned(db: DB, owner_id: UserId, note_id: NoteId) -> db::Result<NoteRecord> {
    db.call(move |conn| {
        conn.query_row(
            "SELECT id, owner_id, title, body, created_at, updated_at FROM notes WHERE id = ? AND owner_id = ?",
            params![note_id, owner_id],
            |row| NoteRecord::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
}

/// Replaces title and body. The ownership check and the write share one
/// transaction; concurrent updates of the same note are last write wins.
pub async fn update_owned(
    db: DB,
    owner_id: UserId,
    note_id: NoteId,
    title: String,
    body: Option<String>,
    now: DateTime<Utc>,
) -> db::Result<NoteRecord> {
    db.call(move |conn| {
        let tx = conn.transaction()?;

        let previous: DateTime<Utc> = tx.query_row(
            "SELECT updated_at FROM notes WHERE id = ? AND owner_id = ?",
            params![note_id, owner_id],
            |row| row.get(0),
        )?;

        let record = tx.query_row(
            r#"UPDATE notes SET title = ?, body = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            RETURNING id, owner_id, title, body, created_at, updated_at"#,
            params![title, body, next_updated_at(previous, now), note_id, owner_id],
            |row| NoteRecord::try_from(row),
        )?;

        tx.commit()?;
        Ok(record)
    })
    .await
    .map_err(db::Error::from)
}

pub async fn delete_owned(db: DB, owner_id: UserId, note_id: NoteId) -> db::Result<()> {
    let deleted = db
        .call(move |conn| {
            conn.execute(
                "DELETE FROM notes WHERE id = ? AND owner_id = ?",
                params![note_id, owner_id],
            )
            .map_err(|e| e.into())
        })
        .await
        .map_err(db::Error::from)?;

    match deleted {
        0 => Err(db::Error::NotFound("Not found".into())),
        _ => Ok(()),
    }
}

/// `updated_at` only moves forward, even if the wall clock does not.
fn next_updated_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}
