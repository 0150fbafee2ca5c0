use base64::Engine;
use eyre::Result;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

/// Credentials attached to every request a client sends
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Use an API key authentication via headers
    Apikey(String),
    /// Use username and password authentication via Basic Auth headers
    Basic(String, String),
    /// Use a bearer token
    Bearer(String),
    /// Don't use any authentication
    None,
}

impl Auth {
    /// Pick an auth method from optional credentials
    ///
    /// An API key wins over username/password. Missing credentials mean no auth.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
        apikey: Option<String>,
    ) -> Self {
        match (username, password, apikey) {
            (_, _, Some(apikey)) if !apikey.is_empty() => Self::Apikey(apikey),
            (Some(username), Some(password), _) if !username.is_empty() => {
                Self::Basic(username, password)
            }
            _ => Self::None,
        }
    }

    /// Add the Authorization header for this auth method
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        match self {
            Self::Basic(username, password) => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {}", credentials))?,
                );
            }
            Self::Apikey(apikey) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("ApiKey {}", apikey))?,
                );
            }
            Self::Bearer(token) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", token))?,
                );
            }
            Self::None => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apikey(_) => write!(f, "Apikey"),
            Self::Basic(_, _) => write!(f, "Basic"),
            Self::Bearer(_) => write!(f, "Bearer"),
            Self::None => write!(f, "None"),
        }
    }
}

// Never print credentials
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Auth::{}", self)
    }
}
