use chrono::Utc;

use crate::{
    crypto::{self, FieldCodec},
    ctx::BaseParams,
    db::DB,
    users::UserId,
    Error, Result,
};

use super::{store, CreateNote, DeleteNoteResponse, Note, NoteId, NoteListing, NoteRecord, UpdateNote};

const NOT_FOUND: &str = "Note not found";

pub async fn find_notes(BaseParams { db, codec, ctx }: BaseParams) -> Result<NoteListing> {
    let owner_id = ctx.require_user_id()?;

    let records = store::find_by_owner(db, owner_id).await.map_err(Error::from)?;

    let mut listing = NoteListing::default();
    for record in records {
        let note_id = record.id;
        match open(&codec, record) {
            Ok(note) => listing.notes.push(note),
            Err(err) => {
                tracing::error!(%note_id, %owner_id, error = %err, "note excluded from listing");
                listing.unreadable.push(note_id);
            }
        }
    }

    Ok(listing)
}

pub async fn create_note(CreateNote { title, body }: CreateNote, BaseParams { db, codec, ctx }: BaseParams) -> Result<Note> {
    let owner_id = ctx.require_user_id()?;
    validate_title(&title)?;

    let title = codec.encrypt_field(&title)?;
    let body = codec.encrypt_optional(body.as_deref())?;

    let record = store::insert(db, owner_id, title, body, Utc::now())
        .await
        .map_err(Error::from)?;

    tracing::debug!(note_id = %record.id, %owner_id, "note created");

    Ok(open(&codec, record)?)
}

pub async fn get_note(note_id: NoteId, BaseParams { db, codec, ctx }: BaseParams) -> Result<Note> {
    let owner_id = ctx.require_user_id()?;

    let record = store::find_owned(db, owner_id, note_id)
        .await
        .map_err(|e| e.not_found_message(NOT_FOUND))
        .map_err(Error::from)?;

    Ok(open(&codec, record)?)
}

/// Refuses to overwrite a stored note that no longer verifies.
pub async fn update_note(
    note_id: NoteId,
    UpdateNote { title, body }: UpdateNote,
    BaseParams { db, codec, ctx }: BaseParams,
) -> Result<Note> {
    let owner_id = ctx.require_user_id()?;
    validate_title(&title)?;

    verify_stored(&db, &codec, owner_id, note_id).await?;

    let title = codec.encrypt_field(&title)?;
    let body = codec.encrypt_optional(body.as_deref())?;

    let record = store::update_owned(db, owner_id, note_id, title, body, Utc::now())
        .await
        .map_err(|e| e.not_found_message(NOT_FOUND))
        .map_err(Error::from)?;

    tracing::debug!(%note_id, %owner_id, "note updated");

    Ok(open(&codec, record)?)
}

/// A stored note that no longer verifies is refused with `IntegrityFailure`
/// rather than deleted.
pub async fn delete_note(note_id: NoteId, BaseParams { db, codec, ctx }: BaseParams) -> Result<DeleteNoteResponse> {
    let owner_id = ctx.require_user_id()?;

    verify_stored(&db, &codec, owner_id, note_id).await?;

    store::delete_owned(db, owner_id, note_id)
        .await
        .map_err(|e| e.not_found_message(NOT_FOUND))
        .map_err(Error::from)?;

    tracing::debug!(%note_id, %owner_id, "note deleted");

    Ok(DeleteNoteResponse { success: true })
}

async fn verify_stored(db: &DB, codec: &FieldCodec, owner_id: UserId, note_id: NoteId) -> Result<()> {
    let existing = store::find_owned(db.clone(), owner_id, note_id)
        .await
        .map_err(|e| e.not_found_message(NOT_FOUND))
        .map_err(Error::from)?;

    open(codec, existing).map(|_| ()).map_err(|err| {
        tracing::error!(%note_id, %owner_id, error = %err, "stored note failed verification");
        Error::from(err)
    })
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("Title is required".into()));
    }
    Ok(())
}

fn open(codec: &FieldCodec, record: NoteRecord) -> crypto::Result<Note> {
    Ok(Note {
        id: record.id,
        owner_id: record.owner_id,
        title: codec.decrypt_field(&record.title)?,
        body: codec.decrypt_optional(record.body.as_deref())?,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::{
        ctx::Ctx,
        db::{init_test_db, DB},
        tests::{test_codec, test_user},
    };

    async fn base(db: &DB, email: &str) -> BaseParams {
        let user = test_user(db, email).await;
        BaseParams::new(db.clone(), test_codec(), Ctx::new(Some(user.into())))
    }

    fn anonymous(db: &DB) -> BaseParams {
        BaseParams::new(db.clone(), test_codec(), Ctx::new(None))
    }

    fn input(title: &str, body: Option<&str>) -> CreateNote {
        CreateNote {
            title: title.into(),
            body: body.map(Into::into),
        }
    }

    fn update(title: &str, body: Option<&str>) -> UpdateNote {
        UpdateNote {
            title: title.into(),
            body: body.map(Into::into),
        }
    }

    async fn stored_row(db: &DB, note_id: NoteId) -> (String, Option<String>) {
        db.call(move |conn| {
            conn.query_row("SELECT title, body FROM notes WHERE id = ?", [note_id], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .map_err(|e| e.into())
        })
        .await
        .unwrap()
    }

    async fn count_notes(db: &DB) -> u32 {
        db.call(|conn| {
            conn.query_row::<u32, _, _>("SELECT count(*) FROM notes", [], |r| r.get(0))
                .map_err(|e| e.into())
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn trip_scenario() -> Result<()> {
        let db = init_test_db().await?;
        let u1 = base(&db, "u1@mail.com").await;

        let created = create_note(input("Trip", Some("Pack sunscreen")), u1.clone()).await?;
        assert_eq!(created.title, "Trip");
        assert_eq!(created.body.as_deref(), Some("Pack sunscreen"));
        assert_eq!(created.created_at, created.updated_at);

        let (title, body) = stored_row(&db, created.id).await;
        assert!(!title.contains("Trip"));
        assert!(!body.clone().unwrap().contains("Pack sunscreen"));
        assert!(title.starts_with("v1.") && body.unwrap().starts_with("v1."));

        let updated = update_note(
            created.id,
            update("Trip plan", Some("Pack sunscreen and passport")),
            u1.clone(),
        )
        .await?;
        assert_eq!(updated.title, "Trip plan");
        assert_eq!(updated.body.as_deref(), Some("Pack sunscreen and passport"));
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);

        let listing = find_notes(u1.clone()).await?;
        assert_eq!(listing.notes, vec![updated.clone()]);
        assert!(listing.unreadable.is_empty());

        let deleted = delete_note(created.id, u1.clone()).await?;
        assert!(deleted.success);

        let again = update_note(created.id, update("Trip", None), u1.clone()).await;
        assert!(matches!(again, Err(Error::NotFound(_))));
        let again = delete_note(created.id, u1).await;
        assert!(matches!(again, Err(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn other_users_see_not_found() -> Result<()> {
        let db = init_test_db().await?;
        let a = base(&db, "a@mail.com").await;
        let b = base(&db, "b@mail.com").await;

        let note = create_note(input("Private", Some("mine")), a.clone()).await?;

        let foreign_update = update_note(note.id, update("Hijacked", None), b.clone()).await;
        let foreign_delete = delete_note(note.id, b.clone()).await;
        let foreign_get = get_note(note.id, b.clone()).await;
        let missing_update = update_note(Uuid::now_v7(), update("Hijacked", None), b.clone()).await;

        // same error, same message, whether the note exists or not
        for result in [foreign_update.map(|_| ()), foreign_delete.map(|_| ()), foreign_get.map(|_| ()), missing_update.map(|_| ())] {
            match result {
                Err(Error::NotFound(message)) => assert_eq!(message, "Note not found"),
                other => panic!("expected not found, got {other:?}"),
            }
        }

        assert!(find_notes(b).await?.notes.is_empty());

        let untouched = get_note(note.id, a).await?;
        assert_eq!(untouched.title, "Private");
        assert_eq!(untouched.body.as_deref(), Some("mine"));
        Ok(())
    }

    #[tokio::test]
    async fn list_is_newest_first() -> Result<()> {
        let db = init_test_db().await?;
        let caller = base(&db, "a@mail.com").await;
        let owner_id = caller.ctx.require_user_id()?;
        let codec = test_codec();

        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let t2 = t1 + chrono::Duration::minutes(5);
        let t3 = t2 + chrono::Duration::minutes(5);

        for (title, at) in [("second", t2), ("first", t1), ("third", t3)] {
            store::insert(db.clone(), owner_id, codec.encrypt_field(title)?, None, at).await?;
        }

        let titles = find_notes(caller)
            .await?
            .notes
            .into_iter()
            .map(|n| n.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["third", "second", "first"]);
        Ok(())
    }

    #[tokio::test]
    async fn blank_titles_are_rejected() -> Result<()> {
        let db = init_test_db().await?;
        let caller = base(&db, "a@mail.com").await;

        for title in ["", "   ", "\n\t"] {
            let result = create_note(input(title, Some("body")), caller.clone()).await;
            assert!(matches!(result, Err(Error::Validation(_))));
        }
        assert_eq!(count_notes(&db).await, 0);

        let note = create_note(input("Groceries", None), caller.clone()).await?;
        let result = update_note(note.id, update(" ", None), caller.clone()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(get_note(note.id, caller).await?.title, "Groceries");
        Ok(())
    }

    #[tokio::test]
    async fn absent_and_empty_body_differ() -> Result<()> {
        let db = init_test_db().await?;
        let caller = base(&db, "a@mail.com").await;

        let absent = create_note(input("Groceries", None), caller.clone()).await?;
        let empty = create_note(input("Empty", Some("")), caller.clone()).await?;

        assert_eq!(absent.body, None);
        assert_eq!(empty.body, Some(String::new()));
        assert_eq!(stored_row(&db, absent.id).await.1, None);
        assert!(stored_row(&db, empty.id).await.1.is_some());

        assert_eq!(get_note(absent.id, caller.clone()).await?.body, None);
        assert_eq!(get_note(empty.id, caller.clone()).await?.body, Some(String::new()));

        let cleared = update_note(empty.id, update("Empty", None), caller).await?;
        assert_eq!(cleared.body, None);
        Ok(())
    }

    #[tokio::test]
    async fn unicode_survives() -> Result<()> {
        let db = init_test_db().await?;
        let caller = base(&db, "a@mail.com").await;

        let note = create_note(input("Città 🚲", Some("Ünïcödé · 日本語\n第二行")), caller.clone()).await?;
        let fetched = get_note(note.id, caller).await?;
        assert_eq!(fetched.title, "Città 🚲");
        assert_eq!(fetched.body.as_deref(), Some("Ünïcödé · 日本語\n第二行"));
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_callers_are_rejected_before_storage() -> Result<()> {
        let db = init_test_db().await?;
        let owner = base(&db, "a@mail.com").await;
        let note = create_note(input("Keep", None), owner).await?;

        let anon = anonymous(&db);
        assert!(matches!(find_notes(anon.clone()).await, Err(Error::Unauthenticated)));
        assert!(matches!(
            create_note(input("Nope", None), anon.clone()).await,
            Err(Error::Unauthenticated)
        ));
        // identity is checked before validation
        assert!(matches!(create_note(input("", None), anon.clone()).await, Err(Error::Unauthenticated)));
        assert!(matches!(get_note(note.id, anon.clone()).await, Err(Error::Unauthenticated)));
        assert!(matches!(
            update_note(note.id, update("x", None), anon.clone()).await,
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(delete_note(note.id, anon).await, Err(Error::Unauthenticated)));

        assert_eq!(count_notes(&db).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_rows_are_skipped_in_listing_but_fail_single_reads() -> Result<()> {
        let db = init_test_db().await?;
        let caller = base(&db, "a@mail.com").await;

        let good = create_note(input("Good", Some("fine")), caller.clone()).await?;
        let bad = create_note(input("Bad", Some("broken soon")), caller.clone()).await?;

        let bad_id = bad.id;
        db.call(move |conn| {
            conn.execute(
                "UPDATE notes SET body = 'v1.AAAAAAAAAAAAAAAA.AAAAAAAAAAAAAAAAAAAAAA' WHERE id = ?",
                [bad_id],
            )
            .map_err(|e| e.into())
        })
        .await
        .unwrap();

        let listing = find_notes(caller.clone()).await?;
        assert_eq!(listing.notes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![good.id]);
        assert_eq!(listing.unreadable, vec![bad.id]);

        assert!(matches!(get_note(bad.id, caller.clone()).await, Err(Error::IntegrityFailure)));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_notes_are_neither_overwritten_nor_deleted() -> Result<()> {
        let db = init_test_db().await?;
        let caller = base(&db, "a@mail.com").await;
        let bad = create_note(input("Bad", None), caller.clone()).await?;

        let bad_id = bad.id;
        let corrupt = "v1.AAAAAAAAAAAAAAAA.AAAAAAAAAAAAAAAAAAAAAA";
        db.call(move |conn| {
            conn.execute("UPDATE notes SET title = ? WHERE id = ?", rusqlite::params![corrupt, bad_id])
                .map_err(|e| e.into())
        })
        .await
        .unwrap();

        let updated = update_note(bad.id, update("Fresh", Some("start")), caller.clone()).await;
        assert!(matches!(updated, Err(Error::IntegrityFailure)));
        assert_eq!(stored_row(&db, bad.id).await.0, corrupt);

        let deleted = delete_note(bad.id, caller).await;
        assert!(matches!(deleted, Err(Error::IntegrityFailure)));
        assert_eq!(count_notes(&db).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_key_is_an_integrity_failure() -> Result<()> {
        let db = init_test_db().await?;
        let caller = base(&db, "a@mail.com").await;
        let note = create_note(input("Sealed", None), caller.clone()).await?;

        let rotated = BaseParams {
            codec: FieldCodec::new(&crypto::EncryptionKey::from_bytes([9u8; crypto::KEY_LEN])),
            ..caller
        };

        assert!(matches!(get_note(note.id, rotated.clone()).await, Err(Error::IntegrityFailure)));
        assert!(matches!(
            update_note(note.id, update("Sealed", None), rotated.clone()).await,
            Err(Error::IntegrityFailure)
        ));
        assert_eq!(find_notes(rotated).await?.unreadable, vec![note.id]);
        Ok(())
    }
}
