//! Connection parameters for one chat session.

use url::Url;

use crate::error::ParamsError;

/// Identity, channel and endpoint for one logical session.
///
/// Immutable once built. A change in any field means a new session: the
/// caller tears down the old manager and builds a new one, which also resets
/// the message history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    username: String,
    channel: String,
    endpoint: Url,
}

impl ConnectionParameters {
    /// Validate and build parameters.
    ///
    /// # Errors
    ///
    /// - `ParamsError::EmptyField` if `username` or `channel` is blank
    /// - `ParamsError::InvalidUrl` if `endpoint` does not parse
    /// - `ParamsError::UnsupportedScheme` if `endpoint` is not `ws://` or
    ///   `wss://`
    pub fn new(
        username: impl Into<String>,
        channel: impl Into<String>,
        endpoint: &str,
    ) -> Result<Self, ParamsError> {
        let username = username.into();
        let channel = channel.into();

        if username.trim().is_empty() {
            return Err(ParamsError::EmptyField { field: "username" });
        }
        if channel.trim().is_empty() {
            return Err(ParamsError::EmptyField { field: "channel" });
        }

        let endpoint = Url::parse(endpoint).map_err(|e| ParamsError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        match endpoint.scheme() {
            "ws" | "wss" => {},
            other => return Err(ParamsError::UnsupportedScheme { scheme: other.to_string() }),
        }

        Ok(Self { username, channel, endpoint })
    }

    /// Display name sent to the server.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Channel (room) to join.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Base endpoint, without identity parameters.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Address to open: the endpoint with `username` and `channel` appended
    /// as form-urlencoded query pairs.
    pub fn connect_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("username", &self.username)
            .append_pair("channel", &self.channel);
        url
    }
}
