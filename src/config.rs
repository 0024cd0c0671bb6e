//! Publisher configuration module
//!
//! Loads configuration from environment variables (and `.env`), then applies
//! command-line overrides. Resolves the connection credential into a broker
//! target at connect time.

use crate::connection_string::{Auth, ConnectionString};
use crate::error::PublisherError;
use clap::Parser;
use std::env;
use std::time::Duration;

/// Credential of the local broker emulator, used when none is configured
pub const DEV_CONNECTION_STRING: &str = "Endpoint=sb://localhost;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=SAS_KEY_VALUE;UseDevelopmentEmulator=true;";

/// Hub targeted when none is configured
pub const DEFAULT_HUB: &str = "eh1";

/// Body text of the test message when none is configured
pub const DEFAULT_MESSAGE: &str = "Hello from test script - 1!";

/// Broker port used when the endpoint does not name one
pub const DEFAULT_PORT: u16 = 4222;

/// Command-line overrides
#[derive(Parser, Debug, Default)]
#[command(name = "hub-publisher", version, about = "Send one test event to a broker hub")]
pub struct Cli {
    /// Hub to publish to (overrides EVENT_HUB_NAME)
    #[arg(long)]
    pub hub: Option<String>,

    /// Broker endpoint, e.g. nats://localhost:4222 (overrides BROKER_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Connection string (overrides EVENT_HUB_CONNECTION_STRING)
    #[arg(long)]
    pub connection_string: Option<String>,

    /// Message text placed in the event body (overrides TEST_MESSAGE)
    #[arg(long)]
    pub message: Option<String>,

    /// Seed for the test number, for reproducible payloads
    #[arg(long)]
    pub seed: Option<u64>,

    /// Create the hub's stream if it does not exist
    #[arg(long)]
    pub ensure_hub: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Everything needed to reach one hub
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Explicit endpoint; falls back to the credential's `Endpoint`
    pub endpoint: Option<String>,

    /// Target hub name
    pub hub_name: String,

    /// Connection string credential (empty for anonymous)
    pub credential: String,

    pub connect_timeout: Duration,
}

/// Transport selected by the endpoint scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Nats,
    Tls,
    Memory,
}

/// Resolved connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerTarget {
    pub transport: Transport,
    pub url: String,
    pub hub: String,
    pub auth: Auth,
}

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub connection: ConnectionConfig,

    /// Text placed in the `message` field of the event body
    pub message: String,

    /// Provision the hub stream before publishing
    pub ensure_hub: bool,

    /// Seed for the test number; fresh entropy when unset
    pub seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    pub log_format: LogFormat,
}

impl PublisherConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, PublisherError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PublisherError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credential = lookup("EVENT_HUB_CONNECTION_STRING")
            .unwrap_or_else(|| DEV_CONNECTION_STRING.to_string());

        let hub_name = lookup("EVENT_HUB_NAME").unwrap_or_else(|| DEFAULT_HUB.to_string());

        let endpoint = lookup("BROKER_ENDPOINT").filter(|e| !e.trim().is_empty());

        let message = lookup("TEST_MESSAGE").unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        let connect_timeout = lookup("CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|| "5".to_string())
            .parse::<u64>()
            .map_err(|e| {
                PublisherError::Config(format!("CONNECT_TIMEOUT_SECS must be a valid number: {e}"))
            })?;
        if connect_timeout == 0 {
            return Err(PublisherError::Config(
                "CONNECT_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let ensure_hub = match lookup("ENSURE_HUB") {
            Some(value) => parse_flag(&value).ok_or_else(|| {
                PublisherError::Config(format!("ENSURE_HUB must be true or false, got '{value}'"))
            })?,
            None => false,
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "warn".to_string());

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(PublisherError::Config(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )))
            }
        };

        let config = Self {
            connection: ConnectionConfig {
                endpoint,
                hub_name,
                credential,
                connect_timeout: Duration::from_secs(connect_timeout),
            },
            message,
            ensure_hub,
            seed: None,
            log_level,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the environment
    pub fn apply_cli(mut self, cli: Cli) -> Result<Self, PublisherError> {
        if let Some(hub) = cli.hub {
            self.connection.hub_name = hub;
        }
        if let Some(endpoint) = cli.endpoint {
            self.connection.endpoint = Some(endpoint);
        }
        if let Some(credential) = cli.connection_string {
            self.connection.credential = credential;
        }
        if let Some(message) = cli.message {
            self.message = message;
        }
        if cli.seed.is_some() {
            self.seed = cli.seed;
        }
        self.ensure_hub |= cli.ensure_hub;

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), PublisherError> {
        validate_hub_name(&self.connection.hub_name)
    }
}

impl ConnectionConfig {
    /// Resolve the credential and endpoint into a broker target
    ///
    /// Fails with `InvalidCredential` when the credential is malformed, names
    /// a different hub through `EntityPath`, or no usable endpoint exists.
    pub fn target(&self) -> Result<BrokerTarget, PublisherError> {
        let cs = ConnectionString::parse(&self.credential)?;

        if let Some(entity_path) = cs.entity_path.as_deref() {
            if entity_path != self.hub_name {
                return Err(PublisherError::InvalidCredential(format!(
                    "EntityPath '{entity_path}' does not match hub '{}'",
                    self.hub_name
                )));
            }
        }

        let endpoint = self
            .endpoint
            .as_deref()
            .or(cs.endpoint.as_deref())
            .ok_or_else(|| {
                PublisherError::InvalidCredential(
                    "no Endpoint in connection string and no BROKER_ENDPOINT set".to_string(),
                )
            })?;

        let (transport, url) = resolve_endpoint(endpoint, cs.use_development_emulator)?;

        Ok(BrokerTarget {
            transport,
            url,
            hub: self.hub_name.clone(),
            auth: cs.auth(),
        })
    }
}

/// Map an endpoint to a transport and a connectable URL
///
/// `sb://` endpoints are plaintext against a development emulator and TLS
/// otherwise.
fn resolve_endpoint(endpoint: &str, emulator: bool) -> Result<(Transport, String), PublisherError> {
    let (scheme, rest) = endpoint.trim().split_once("://").ok_or_else(|| {
        PublisherError::InvalidCredential(format!("endpoint '{endpoint}' has no scheme"))
    })?;

    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(PublisherError::InvalidCredential(format!(
            "endpoint '{endpoint}' has no host"
        )));
    }

    let transport = match scheme.to_ascii_lowercase().as_str() {
        "nats" => Transport::Nats,
        "tls" => Transport::Tls,
        "memory" => return Ok((Transport::Memory, format!("memory://{authority}"))),
        "sb" if emulator => Transport::Nats,
        "sb" => Transport::Tls,
        other => {
            return Err(PublisherError::InvalidCredential(format!(
                "unsupported endpoint scheme '{other}'"
            )))
        }
    };

    let has_port = authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    let host_port = if has_port {
        authority.to_string()
    } else {
        format!("{authority}:{DEFAULT_PORT}")
    };

    let scheme = match transport {
        Transport::Tls => "tls",
        _ => "nats",
    };

    Ok((transport, format!("{scheme}://{host_port}")))
}

/// Hub names are used as broker subjects: no whitespace, no wildcards
fn validate_hub_name(hub: &str) -> Result<(), PublisherError> {
    if hub.is_empty() {
        return Err(PublisherError::Config("hub name must not be empty".to_string()));
    }
    if hub.chars().any(|c| c.is_whitespace() || c == '*' || c == '>') {
        return Err(PublisherError::Config(format!(
            "hub name '{hub}' must not contain whitespace or wildcards"
        )));
    }
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
