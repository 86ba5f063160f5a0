use lazy_static::lazy_static;
use rusqlite_migration::{Migrations, M};

lazy_static! {
    pub static ref MIGRATIONS: Migrations<'static> = Migrations::new(vec![
        M::up(
            r#"
            CREATE TABLE users (
                id BLOB PRIMARY KEY CHECK(length(id) = 16) NOT NULL UNIQUE DEFAULT (uuid7_now()),
                email TEXT NOT NULL UNIQUE,
                access_token TEXT UNIQUE,

                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME
            );
        "#
        ),
        // title and body only ever hold field envelopes, body NULL means "no body"
        M::up(
            r#"
            CREATE TABLE notes (
                id BLOB PRIMARY KEY CHECK(length(id) = 16) NOT NULL UNIQUE DEFAULT (uuid7_now()),
                owner_id BLOB NOT NULL CHECK(length(owner_id) = 16),

                title TEXT NOT NULL,
                body TEXT,

                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,

                FOREIGN KEY (owner_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE INDEX notes_owner_updated ON notes (owner_id, updated_at DESC, id);
        "#
        ),
    ]);
}

