//! DTOs for interacting with OAuth2 token endpoints

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::MalformedTokenBody;
use crate::{AccessToken, ClientId, ClientSecret};

/// Client credentials
///
/// Serializes as the body of a `client_credentials` grant request, including
/// the `grant_type` field. Deserializes from `client_id` and `client_secret` only.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientCredentials {
    /// The client ID
    pub client_id: ClientId,

    /// The client secret
    pub client_secret: ClientSecret,
}

impl ClientCredentials {
    /// Constructs a new set of client credentials
    pub fn new(client_id: impl Into<ClientId>, client_secret: impl Into<ClientSecret>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl Serialize for ClientCredentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentials", 3)?;
        ser.serialize_field("grant_type", "client_credentials")?;
        ser.serialize_field("client_id", &self.client_id)?;
        ser.serialize_field("client_secret", &self.client_secret)?;
        ser.end()
    }
}

/// Extracts the access token from a successful token response body
pub(super) fn access_token_from_body(body: &[u8]) -> Result<AccessToken, MalformedTokenBody> {
    let mut object = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => object,
        _ => {
            return Err(MalformedTokenBody::NotAnObject {
                body: String::from_utf8_lossy(body).into_owned(),
            })
        }
    };

    match object.remove("access_token") {
        Some(Value::String(token)) => Ok(AccessToken::new(token)),
        found => Err(MalformedTokenBody::AccessTokenNotAString { found }),
    }
}

/// Renders an error body the way it should appear in error messages
///
/// JSON bodies are re-serialized compactly; anything else is passed through as text.
pub(super) fn serialize_error_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value.to_string(),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}
