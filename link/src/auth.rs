//! Authentication for snapshot queries.
//!
//! The REST endpoint expects the project API key in an `apikey` header and
//! a bearer token in `Authorization`: the signed-in user's access token
//! when there is one, otherwise the API key itself.

/// Credentials attached to every snapshot request.
///
/// # Examples
///
/// ```rust
/// use stallplass_link::AuthProvider;
///
/// // Anonymous (public listings)
/// let auth = AuthProvider::api_key("anon-key");
///
/// // Signed-in user
/// let auth = AuthProvider::session("anon-key", "eyJhbGc...");
/// ```
#[derive(Debug, Clone)]
pub enum AuthProvider {
    /// Project API key only
    ApiKey(String),

    /// Project API key plus a user access token
    Session { api_key: String, access_token: String },

    /// No authentication (local development)
    None,
}

impl AuthProvider {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    pub fn session(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::Session {
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }

    pub fn none() -> Self {
        Self::None
    }

    /// Attach authentication headers to an HTTP request builder
    ///
    /// - ApiKey: `apikey: <key>` and `Authorization: Bearer <key>`
    /// - Session: `apikey: <key>` and `Authorization: Bearer <access_token>`
    /// - None: No headers
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::ApiKey(key) => request.header("apikey", key).bearer_auth(key),
            Self::Session {
                api_key,
                access_token,
            } => request.header("apikey", api_key).bearer_auth(access_token),
            Self::None => request,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}
