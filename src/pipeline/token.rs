//! Bearer token authentication stage.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use super::{PipelineRequest, Stage};
use crate::error::ApiError;
use crate::security::token::{mask_token, TokenError};
use crate::security::TokenService;

pub const TOKEN_HEADER: &str = "x-token";

/// Token from `X-Token`, else from `Authorization: Bearer`.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let direct = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if direct.is_some() {
        return direct;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub struct TokenStage {
    tokens: Arc<TokenService>,
}

impl TokenStage {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Stage for TokenStage {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn apply(&self, req: &mut PipelineRequest<'_>) -> Result<(), ApiError> {
        let token = extract_token(req.headers)
            .ok_or_else(|| ApiError::unauthorized("token is missing"))?;

        match self.tokens.verify(token) {
            Ok(claims) => {
                req.ctx.subject = Some(claims.user_id);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(
                    trace_id = %req.ctx.trace_id,
                    token = %mask_token(token),
                    reason = %err,
                    "Token rejected"
                );
                Err(match err {
                    TokenError::Expired => ApiError::unauthorized("token has expired"),
                    _ => ApiError::unauthorized("token is invalid"),
                })
            }
        }
    }
}
