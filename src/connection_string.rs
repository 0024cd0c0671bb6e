//! Connection credential parsing
//!
//! Credentials use the `Key=Value;Key=Value;` connection string form, e.g.
//! `Endpoint=sb://localhost;SharedAccessKeyName=Root;SharedAccessKey=...;UseDevelopmentEmulator=true;`
//!
//! Keys are case-insensitive and values may themselves contain `=`
//! (base64 keys usually end in padding).

use crate::error::PublisherError;
use tracing::debug;

/// Parsed connection credential
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pub endpoint: Option<String>,
    pub shared_access_key_name: Option<String>,
    pub shared_access_key: Option<String>,
    pub shared_access_signature: Option<String>,
    pub entity_path: Option<String>,
    pub use_development_emulator: bool,
}

/// Authentication material carried by a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Anonymous,
    /// Shared access key pair, presented to the broker as user/password
    SharedKey { name: String, key: String },
    /// Pre-signed token
    Signature(String),
}

impl ConnectionString {
    /// Parse a credential string. An empty string means anonymous access.
    pub fn parse(raw: &str) -> Result<Self, PublisherError> {
        let mut parsed = Self::default();
        let mut emulator: Option<bool> = None;

        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                PublisherError::InvalidCredential(format!("segment '{segment}' is not Key=Value"))
            })?;
            let key = key.trim();
            let value = value.trim();

            if key.is_empty() {
                return Err(PublisherError::InvalidCredential(
                    "segment with an empty key".to_string(),
                ));
            }

            let slot = match key.to_ascii_lowercase().as_str() {
                "endpoint" => &mut parsed.endpoint,
                "sharedaccesskeyname" => &mut parsed.shared_access_key_name,
                "sharedaccesskey" => &mut parsed.shared_access_key,
                "sharedaccesssignature" => &mut parsed.shared_access_signature,
                "entitypath" => &mut parsed.entity_path,
                "usedevelopmentemulator" => {
                    if emulator.is_some() {
                        return Err(duplicate(key));
                    }
                    emulator = Some(parse_bool(value).ok_or_else(|| {
                        PublisherError::InvalidCredential(format!(
                            "UseDevelopmentEmulator must be true or false, got '{value}'"
                        ))
                    })?);
                    continue;
                }
                _ => {
                    debug!(key, "Ignoring unknown connection string key");
                    continue;
                }
            };

            if slot.is_some() {
                return Err(duplicate(key));
            }
            *slot = Some(value.to_string());
        }

        parsed.use_development_emulator = emulator.unwrap_or(false);
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), PublisherError> {
        match (&self.shared_access_key_name, &self.shared_access_key) {
            (Some(_), None) => {
                return Err(PublisherError::InvalidCredential(
                    "SharedAccessKeyName is set without SharedAccessKey".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(PublisherError::InvalidCredential(
                    "SharedAccessKey is set without SharedAccessKeyName".to_string(),
                ))
            }
            _ => {}
        }

        if self.shared_access_key.is_some() && self.shared_access_signature.is_some() {
            return Err(PublisherError::InvalidCredential(
                "SharedAccessKey and SharedAccessSignature are mutually exclusive".to_string(),
            ));
        }

        if matches!(self.endpoint.as_deref(), Some("")) {
            return Err(PublisherError::InvalidCredential("Endpoint is empty".to_string()));
        }

        Ok(())
    }

    /// Authentication to present on connect
    pub fn auth(&self) -> Auth {
        match (
            &self.shared_access_key_name,
            &self.shared_access_key,
            &self.shared_access_signature,
        ) {
            (Some(name), Some(key), _) => Auth::SharedKey {
                name: name.clone(),
                key: key.clone(),
            },
            (_, _, Some(signature)) => Auth::Signature(signature.clone()),
            _ => Auth::Anonymous,
        }
    }
}

fn duplicate(key: &str) -> PublisherError {
    PublisherError::InvalidCredential(format!("key '{key}' appears more than once"))
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
