//! Remote-storage ("bbos") environment record.
//!
//! When remote mode is enabled the handle is bound to a bbos
//! environment: a local transport specifier plus the remote endpoint
//! URI built from the configured hostname and port. The driver
//! constructs this at most once per process and attaches it to the
//! handle before open.

/// Environment name handed to the storage layer.
pub const ENV_NAME: &str = "bbos";

/// Local transport specifier.
pub const LOCAL_TRANSPORT: &str = "bmi+tcp";

/// Named-field remote-storage environment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEnv {
    /// Environment name ("bbos")
    pub name: String,
    /// Local transport specifier
    pub local_spec: String,
    /// Remote endpoint URI
    pub remote_uri: String,
}

impl RemoteEnv {
    /// Build the environment record for a remote endpoint.
    pub fn new(hostname: &str, port: u16) -> Self {
        Self {
            name: ENV_NAME.to_string(),
            local_spec: LOCAL_TRANSPORT.to_string(),
            remote_uri: format!("{}://{}:{}", LOCAL_TRANSPORT, hostname, port),
        }
    }
}

impl std::fmt::Display for RemoteEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} local={} remote={}",
            self.name, self.local_spec, self.remote_uri
        )
    }
}
