//! 请求鉴权分派：在 Bearer 令牌与 API Key 之间二选一，产出统一身份上下文。
//!
//! 优先级固定：只要带了 `Authorization` 头就只走令牌校验，`api-key` 头不再参与。

use ag_shared_protocol::{API_KEY_HEADER, AUTHORIZATION_HEADER, AccessBy, ProfilePayload};
use axum::http::HeaderMap;

use crate::auth::{
    api_key::{ApiKeyError, ApiKeyValidator},
    store::StoreError,
    token::TokenCodec,
};

/// 请求级身份上下文，仅存在于单次请求内。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthContext {
    Jwt {
        user_id: u64,
        role: String,
    },
    ApiKey {
        user_id: u64,
        client: String,
        scope: String,
    },
}

impl AuthContext {
    pub(crate) fn user_id(&self) -> u64 {
        match self {
            Self::Jwt { user_id, .. } | Self::ApiKey { user_id, .. } => *user_id,
        }
    }

    /// 转为资料视图。
    pub(crate) fn to_profile(&self) -> ProfilePayload {
        match self {
            Self::Jwt { user_id, role } => ProfilePayload {
                user_id: *user_id,
                role: role.clone(),
                client_id: None,
                access_by: AccessBy::Jwt,
            },
            Self::ApiKey {
                user_id,
                client,
                scope,
            } => ProfilePayload {
                user_id: *user_id,
                role: scope.clone(),
                client_id: Some(client.clone()),
                access_by: AccessBy::ApiKey,
            },
        }
    }
}

/// 鉴权拒绝原因；对外统一为 401（存储故障除外）。
#[derive(Debug, thiserror::Error)]
pub(crate) enum Rejection {
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("invalid access token")]
    InvalidToken,
    #[error("invalid api key")]
    InvalidKey,
    #[error("missing credentials")]
    MissingCredentials,
    #[error(transparent)]
    StoreUnavailable(StoreError),
}

/// 请求头读取结果。
enum HeaderSlot<'a> {
    Absent,
    Present(&'a str),
    /// 头存在但不是可见 ASCII。
    Unreadable,
}

/// 读取请求头；只有完全为空的值视同缺省，空白值照常交给后续校验。
fn read_header<'a>(headers: &'a HeaderMap, name: &str) -> HeaderSlot<'a> {
    let Some(value) = headers.get(name) else {
        return HeaderSlot::Absent;
    };
    match value.to_str() {
        Ok("") => HeaderSlot::Absent,
        Ok(raw) => HeaderSlot::Present(raw),
        Err(_) => HeaderSlot::Unreadable,
    }
}

/// 解析 `Bearer <token>`：必须恰好两段，scheme 大小写不敏感。
pub(crate) fn parse_bearer(raw: &str) -> Result<&str, Rejection> {
    let mut parts = raw.split_whitespace();
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Rejection::MalformedHeader);
    };
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(Rejection::MalformedHeader);
    }
    Ok(token)
}

/// 鉴权分派器。
#[derive(Clone)]
pub(crate) struct AuthDispatcher {
    codec: TokenCodec,
    keys: ApiKeyValidator,
}

impl AuthDispatcher {
    pub(crate) fn new(codec: TokenCodec, keys: ApiKeyValidator) -> Self {
        Self { codec, keys }
    }

    /// 鉴权入口：Authorization 优先，其次 api-key，都没有则拒绝。
    pub(crate) async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, Rejection> {
        match read_header(headers, AUTHORIZATION_HEADER) {
            HeaderSlot::Present(raw) => return self.authenticate_bearer(raw),
            HeaderSlot::Unreadable => return Err(Rejection::MalformedHeader),
            HeaderSlot::Absent => {}
        }

        match read_header(headers, API_KEY_HEADER) {
            HeaderSlot::Present(raw) => self.authenticate_api_key(raw).await,
            HeaderSlot::Unreadable => Err(Rejection::InvalidKey),
            HeaderSlot::Absent => Err(Rejection::MissingCredentials),
        }
    }

    fn authenticate_bearer(&self, raw: &str) -> Result<AuthContext, Rejection> {
        let token = parse_bearer(raw)?;
        let claims = self
            .codec
            .verify(token)
            .map_err(|_| Rejection::InvalidToken)?;
        Ok(AuthContext::Jwt {
            user_id: claims.user_id,
            role: claims.role,
        })
    }

    async fn authenticate_api_key(&self, raw: &str) -> Result<AuthContext, Rejection> {
        let grant = self.keys.lookup(raw).await.map_err(|err| match err {
            ApiKeyError::Inactive => Rejection::InvalidKey,
            ApiKeyError::Store(err) => Rejection::StoreUnavailable(err),
        })?;
        Ok(AuthContext::ApiKey {
            user_id: grant.user_id,
            client: grant.client,
            scope: grant.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{HeaderMap, HeaderValue};

    use super::{AuthContext, AuthDispatcher, Rejection, parse_bearer};
    use crate::auth::{
        api_key::ApiKeyValidator,
        store::{FileCredentialStore, testing::FaultyStore},
        token::{SigningSecret, TokenCodec},
    };

    fn codec() -> TokenCodec {
        TokenCodec::new(SigningSecret::new("dispatch-test-secret").expect("secret"))
    }

    async fn fixture() -> (AuthDispatcher, String, String) {
        let store = Arc::new(FileCredentialStore::in_memory());
        let keys = ApiKeyValidator::new(store);
        let key = keys.create(99, "reporting", "read").await.expect("key").key;
        let codec = codec();
        let token = codec.issue(42, "admin").expect("token");
        (AuthDispatcher::new(codec, keys), token, key)
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).expect("header value"));
        }
        map
    }

    #[test]
    fn bearer_parsing_requires_exactly_two_tokens() {
        assert_eq!(parse_bearer("Bearer abc").expect("ok"), "abc");
        assert_eq!(parse_bearer("bearer  abc").expect("ok"), "abc");
        assert_eq!(parse_bearer("BEARER\tabc").expect("ok"), "abc");
        for raw in ["Bearer", "Bearer a b", "Basic abc", "abc", "Token abc"] {
            assert!(matches!(parse_bearer(raw), Err(Rejection::MalformedHeader)), "{raw}");
        }
    }

    #[tokio::test]
    async fn bearer_token_wins_over_api_key() {
        let (dispatcher, token, key) = fixture().await;
        let bearer = format!("Bearer {token}");
        let ctx = dispatcher
            .authenticate(&headers(&[("authorization", &bearer), ("api-key", &key)]))
            .await
            .expect("authenticated");
        assert_eq!(
            ctx,
            AuthContext::Jwt {
                user_id: 42,
                role: "admin".to_string()
            }
        );
    }

    #[tokio::test]
    async fn invalid_bearer_is_not_rescued_by_valid_api_key() {
        let (dispatcher, _, key) = fixture().await;
        let result = dispatcher
            .authenticate(&headers(&[("authorization", "Bearer nope"), ("api-key", &key)]))
            .await;
        assert!(matches!(result, Err(Rejection::InvalidToken)));

        let result = dispatcher
            .authenticate(&headers(&[("authorization", "Basic Zm9vOmJhcg=="), ("api-key", &key)]))
            .await;
        assert!(matches!(result, Err(Rejection::MalformedHeader)));
    }

    #[tokio::test]
    async fn api_key_is_used_when_no_authorization_header() {
        let (dispatcher, _, key) = fixture().await;
        let ctx = dispatcher
            .authenticate(&headers(&[("api-key", &key)]))
            .await
            .expect("authenticated");
        assert_eq!(
            ctx,
            AuthContext::ApiKey {
                user_id: 99,
                client: "reporting".to_string(),
                scope: "read".to_string()
            }
        );
        assert_eq!(ctx.user_id(), 99);
    }

    #[tokio::test]
    async fn unknown_api_key_and_missing_credentials_are_rejected() {
        let (dispatcher, _, _) = fixture().await;
        let result = dispatcher
            .authenticate(&headers(&[("api-key", "agk_unknown")]))
            .await;
        assert!(matches!(result, Err(Rejection::InvalidKey)));

        let result = dispatcher.authenticate(&HeaderMap::new()).await;
        assert!(matches!(result, Err(Rejection::MissingCredentials)));

    }

    #[tokio::test]
    async fn only_an_empty_authorization_value_falls_through_to_api_key() {
        let (dispatcher, _, key) = fixture().await;
        let ctx = dispatcher
            .authenticate(&headers(&[("authorization", ""), ("api-key", &key)]))
            .await
            .expect("empty authorization is absent");
        assert!(matches!(ctx, AuthContext::ApiKey { .. }));

        for blank in [" ", "   ", "\t"] {
            let result = dispatcher
                .authenticate(&headers(&[("authorization", blank), ("api-key", &key)]))
                .await;
            assert!(matches!(result, Err(Rejection::MalformedHeader)), "{blank:?}");
        }
    }

    #[tokio::test]
    async fn api_key_must_match_exactly() {
        let (dispatcher, _, key) = fixture().await;
        let padded = format!("{key} ");
        let result = dispatcher
            .authenticate(&headers(&[("api-key", &padded)]))
            .await;
        assert!(matches!(result, Err(Rejection::InvalidKey)));
    }

    #[tokio::test]
    async fn non_ascii_authorization_header_is_malformed() {
        let (dispatcher, _, key) = fixture().await;
        let mut map = headers(&[("api-key", &key)]);
        map.insert(
            "authorization",
            HeaderValue::from_bytes(b"Bearer \xff\xfe").expect("opaque bytes"),
        );
        let result = dispatcher.authenticate(&map).await;
        assert!(matches!(result, Err(Rejection::MalformedHeader)));
    }

    #[tokio::test]
    async fn store_failure_during_key_lookup_is_not_an_auth_rejection() {
        let keys = ApiKeyValidator::new(Arc::new(FaultyStore::broken()));
        let dispatcher = AuthDispatcher::new(codec(), keys);
        let result = dispatcher
            .authenticate(&headers(&[("api-key", "agk_any")]))
            .await;
        assert!(matches!(result, Err(Rejection::StoreUnavailable(_))));

        // 令牌路径无状态，不受存储故障影响。
        let token = codec().issue(5, "user").expect("token");
        let bearer = format!("Bearer {token}");
        assert!(
            dispatcher
                .authenticate(&headers(&[("authorization", &bearer)]))
                .await
                .is_ok()
        );
    }
}
