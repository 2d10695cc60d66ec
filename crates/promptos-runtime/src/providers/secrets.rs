//! Secure credential handling for LLM providers.
//!
//! Credentials are wrapped in [`ApiCredential`] the moment they enter the
//! process, whether read from the environment or typed into the web form.
//! After that point they cannot be printed through `Debug` or `Display`.
//!
//! ## Usage
//!
//! ```ignore
//! use promptos_runtime::providers::{ApiCredential, CredentialSource};
//!
//! // Read once at startup
//! let cred = ApiCredential::from_env("OPENAI_API_KEY", "OpenAI API key");
//!
//! // Use in HTTP header (explicit exposure)
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a credential was loaded from.
///
/// This is useful for debugging configuration issues without
/// exposing the actual credential value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from environment variable
    Environment,
    /// Entered by a user in the web form
    Form,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Form => write!(f, "form"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// This wrapper provides:
/// - Debug and Display implementations that show `[REDACTED]`
/// - Memory zeroing on drop via the `secrecy` crate
/// - Explicit exposure via `.expose()`
///
/// # Example
///
/// ```ignore
/// let cred = ApiCredential::new("sk-secret-key", CredentialSource::Environment, "OpenAI API key");
///
/// // Safe to log/debug - shows [REDACTED]
/// println!("Provider credential: {:?}", cred);
///
/// // Explicit exposure for API calls
/// let key = cred.expose();
/// ```
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    ///
    /// The value is immediately wrapped in SecretString and cannot
    /// be accidentally logged after this point.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load a credential from an environment variable.
    ///
    /// Returns `None` when the variable is unset or blank. A missing key is
    /// not an error here: the grader reports it when a grading is attempted.
    pub fn from_env(env_var: &str, name: &'static str) -> Option<Self> {
        std::env::var(env_var)
            .ok()
            .and_then(|v| Self::non_blank(v, CredentialSource::Environment, name))
    }

    /// Wrap a user-supplied value, rejecting blank input.
    pub fn non_blank(
        value: impl Into<String>,
        source: CredentialSource,
        name: &'static str,
    ) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self::new(value.trim().to_string(), source, name))
        }
    }

    /// Expose the credential value for use in API calls.
    ///
    /// # Security
    ///
    /// Only call this at the point where the credential is actually needed
    /// (e.g., setting an HTTP header). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Check if the credential is empty.
    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    /// Get the source of this credential.
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Get the human-readable name of this credential.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
