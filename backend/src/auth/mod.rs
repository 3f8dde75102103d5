use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;

use crate::axum_http::error_responses::HttpError;
use domain::{error::BookingError, repositories::service_gateway::ServiceGateway};

/// Authenticated caller, resolved by the user service. Extracting this in
/// a handler is what makes the route require a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email_user: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<dyn ServiceGateway>: FromRef<S>,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(HttpError(BookingError::Unauthorized))?;

        let gateway = Arc::<dyn ServiceGateway>::from_ref(state);
        let identity = gateway.validate_token(&token).await?;

        Ok(AuthUser {
            user_id: identity.user_id,
            email_user: identity.email_user,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_authorization(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/bookings");
        if let Some(value) = value {
            builder = builder.header(axum::http::header::AUTHORIZATION, value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn extracts_the_bearer_token() {
        let parts = parts_with_authorization(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        assert_eq!(bearer_token(&parts_with_authorization(None)), None);
        assert_eq!(
            bearer_token(&parts_with_authorization(Some("Basic dXNlcg=="))),
            None
        );
    }
}
