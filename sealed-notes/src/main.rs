mod config;

mod app;
mod crypto;
mod ctx;
mod db;
mod errors;
mod notes;
mod openapi;
mod shared;
mod state;
mod users;

use std::net::SocketAddr;

use aide::axum::ApiRouter;
use app::AppParams;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use crypto::{EncryptionKey, FieldCodec};
pub use db::{init_db, DB};
pub use errors::{Error, Result};
use shared::tracing::{add_tracing_layer, setup_tracing};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(version, about = "Personal notes, encrypted at rest")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create a user, or rotate the access token of an existing one
    AddUser {
        #[arg(long)]
        email: String,
    },
    /// Print a fresh base64 value for NOTES_ENCRYPTION_KEY
    GenerateKey,
}

#[tokio::main]
async fn main() -> errors::Result<()> {
    let cli = Cli::parse();
    let config = config::init()?;

    setup_tracing(config.log_json, config.tokio_console);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::AddUser { email } => add_user(config, email).await,
        Command::GenerateKey => {
            println!("{}", EncryptionKey::generate().to_base64());
            Ok(())
        }
    }
}

async fn serve(config: &config::Config) -> errors::Result<()> {
    let configured_key = config.notes_encryption_key.as_ref().map(|k| k.expose_secret());
    let key = EncryptionKey::from_config(configured_key).map_err(|err| {
        tracing::error!(error = %err, "refusing to start without an encryption key");
        err
    })?;
    let codec = FieldCodec::new(&key);

    let conn = init_db(&config.database_url).await?;

    let (app, _) = app::create(AppParams {
        db: conn,
        codec,
        router: |state| ApiRouter::new().merge(notes::router(state)),
    })
    .await?;

    let app = add_tracing_layer(app);

    let port = config.port;
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;

    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

async fn add_user(config: &config::Config, email: String) -> errors::Result<()> {
    let email = email.trim().to_owned();
    if email.is_empty() {
        return Err(Error::Validation("Email is required".into()));
    }

    let conn = init_db(&config.database_url).await?;
    let user = users::issue_access_token(conn, email).await?;

    tracing::info!(user_id = %user.id, "access token issued");
    println!("{}", user.access_token.unwrap_or_default());

    Ok(())
}

#[cfg(test)]
pub mod tests {
    use crate::{
        app::{create, AppParams},
        crypto::{EncryptionKey, FieldCodec},
        errors::Result,
        state::AppState,
        users, DB,
    };
    use aide::axum::ApiRouter;
    use axum_test::{TestServer, TestServerConfig, Transport};

    pub async fn test_server<R>(db: DB, codec: FieldCodec, router: R) -> Result<TestServer>
    where
        R: FnOnce(AppState) -> ApiRouter,
    {
        let (app, _) = create(AppParams { db, codec, router }).await?;

        let config = TestServerConfig {
            transport: Some(Transport::MockHttp),
            save_cookies: true,
            expect_success_by_default: true,
            ..TestServerConfig::default()
        };

        Ok(TestServer::new_with_config(app, config).unwrap())
    }

    pub fn test_codec() -> FieldCodec {
        FieldCodec::new(&EncryptionKey::from_bytes([7; 32]))
    }

    pub async fn test_user(db: &DB, email: &str) -> users::User {
        users::issue_access_token(db.clone(), email.into()).await.unwrap()
    }
}
