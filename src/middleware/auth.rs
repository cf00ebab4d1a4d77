use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::auth::{validate_jwt, Claims};
use crate::error::ApiError;

/// Authenticated staff user extracted from the JWT
#[derive(Clone, Debug, Default, Serialize)]
pub struct StaffUser {
    pub username: String,
    pub is_superuser: bool,
    pub permissions: Vec<String>,
}

impl StaffUser {
    pub fn has_perm(&self, codename: &str) -> bool {
        self.is_superuser || self.permissions.iter().any(|p| p == codename)
    }
}

impl From<Claims> for StaffUser {
    fn from(claims: Claims) -> Self {
        Self {
            username: claims.sub,
            is_superuser: claims.is_superuser,
            permissions: claims.permissions,
        }
    }
}

/// JWT authentication middleware: validates the bearer token, rejects
/// non-staff users and injects [`StaffUser`] into the request
pub async fn jwt_auth_middleware(headers: HeaderMap, mut request: Request, next: Next) -> Response {
    let token = match extract_jwt_from_headers(&headers) {
        Ok(token) => token,
        Err(msg) => return ApiError::unauthorized(msg).into_response(),
    };

    let claims = match validate_jwt(&token) {
        Ok(claims) => claims,
        Err(e) => return ApiError::unauthorized(e.to_string()).into_response(),
    };

    if !claims.is_staff {
        tracing::warn!("Rejected non-staff user {}", claims.sub);
        return ApiError::forbidden("Staff access required").into_response();
    }

    request.extensions_mut().insert(StaffUser::from(claims));
    next.run(request).await
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Some(_) => Err("Empty JWT token".to_string()),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_tokens() {
        let mut headers = HeaderMap::new();
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_jwt_from_headers(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn superusers_hold_every_permission() {
        let user = StaffUser { username: "root".to_string(), is_superuser: true, permissions: vec![] };
        assert!(user.has_perm("shop.change_product"));

        let user = StaffUser {
            username: "clerk".to_string(),
            is_superuser: false,
            permissions: vec!["shop.change_product".to_string()],
        };
        assert!(user.has_perm("shop.change_product"));
        assert!(!user.has_perm("shop.change_order"));
    }
}
