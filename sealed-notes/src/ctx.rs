use axum::{
    extract::{Extension, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use schemars::JsonSchema;
use serde::Serialize;

use crate::{
    crypto::FieldCodec,
    db::DB,
    users::{self, UserId},
    Error,
};

#[derive(Clone, Debug, FromRequestParts)]
pub struct BaseParams {
    pub ctx: Ctx,
    #[from_request(via(Extension))]
    pub db: DB,
    #[from_request(via(Extension))]
    pub codec: FieldCodec,
}

impl BaseParams {
    pub fn new(db: DB, codec: FieldCodec, ctx: Ctx) -> Self {
        Self { db, codec, ctx }
    }
}

#[derive(Debug, Serialize, Clone, JsonSchema)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

impl From<users::User> for User {
    fn from(user: users::User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// Caller identity for one request. `user` is `None` for anonymous callers.
#[derive(Clone, Debug)]
pub struct Ctx {
    pub user: Option<User>,
}

impl Ctx {
    pub fn new(user: Option<User>) -> Self {
        Self { user }
    }

    pub fn get_user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn require_user_id(&self) -> crate::Result<UserId> {
        self.get_user_id().ok_or(Error::Unauthenticated)
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // already resolved by `authenticated`
        if let Some(ctx) = parts.extensions.get::<Ctx>() {
            return Ok(ctx.clone());
        }

        let Some(access_token) = bearer_token(&parts.headers) else {
            return Ok(Self::new(None));
        };

        let db = parts
            .extensions
            .get::<DB>()
            .cloned()
            .ok_or_else(|| Error::Unexpected("database is not attached to the request".into()))?;

        let user = users::find_one_by_access_token(db, access_token)
            .await?
            .map(User::from);

        Ok(Self::new(user))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_owned())
}

/// Rejects anonymous callers before any extractor (and so any body parsing) runs.
pub async fn authenticated(ctx: Ctx, mut request: Request, next: Next) -> crate::Result<Response> {
    if ctx.user.is_none() {
        return Err(Error::Unauthenticated);
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn parses_bearer_tokens() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc".into()));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc".into()));
    }

    #[test]
    fn ignores_other_schemes() {
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
