use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::token::Claims;
use crate::error::AppError;

/// The principal of a request, read from the claims `AuthMiddleware` stored.
///
/// Missing claims mean the middleware did not run for this route; the extractor
/// then fails with `401 Unauthorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub is_admin: bool,
}

impl From<&Claims> for AuthenticatedUser {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub,
            is_admin: claims.is_admin,
        }
    }
}

fn principal(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    req.extensions()
        .get::<Claims>()
        .map(AuthenticatedUser::from)
        .ok_or_else(|| {
            AppError::Unauthorized(
                "User not found in request. Ensure AuthMiddleware is active.".to_string(),
            )
        })
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(principal(req).map_err(Into::into))
    }
}

/// An authenticated principal carrying the admin flag; anyone else gets `403`.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequest for AdminUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = principal(req).and_then(|user| {
            if user.is_admin {
                Ok(AdminUser(user))
            } else {
                log::warn!("User {} denied access to admin route {}", user.id, req.path());
                Err(AppError::Forbidden("Admin access required".into()))
            }
        });
        ready(result.map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::dev::Payload;
    use actix_web::http::StatusCode;
    use actix_web::test;

    fn request_with_claims(sub: i32, is_admin: bool) -> HttpRequest {
        let req = test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(Claims {
            sub,
            is_admin,
            exp: usize::MAX,
        });
        req
    }

    #[actix_rt::test]
    async fn test_authenticated_user_extractor_success() {
        let req = request_with_claims(123, false);

        let mut payload = Payload::None;
        let user = AuthenticatedUser::from_request(&req, &mut payload)
            .await
            .unwrap();
        assert_eq!(
            user,
            AuthenticatedUser {
                id: 123,
                is_admin: false
            }
        );
    }

    #[actix_rt::test]
    async fn test_authenticated_user_extractor_failure() {
        let req = test::TestRequest::default().to_http_request();

        let mut payload = Payload::None;
        let err = AuthenticatedUser::from_request(&req, &mut payload)
            .await
            .unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_admin_extractor_rejects_regular_user() {
        let req = request_with_claims(5, false);

        let mut payload = Payload::None;
        let err = AdminUser::from_request(&req, &mut payload).await.unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn test_admin_extractor_accepts_admin() {
        let req = request_with_claims(9, true);

        let mut payload = Payload::None;
        let AdminUser(admin) = AdminUser::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(admin.id, 9);
        assert!(admin.is_admin);
    }
}
