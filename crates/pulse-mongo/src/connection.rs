use mongodb::error::{Error, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::Client;

use pulse_core::error::DiagError;

use crate::config::MongoTargetConfig;

/// Build a client for `config`.
///
/// The driver connects lazily, so an unreachable deployment surfaces later
/// as a per-query connection failure rather than here. `mongodb+srv://`
/// strings are resolved through DNS while parsing; a lookup failure is a
/// connection error, only a malformed string is a config error.
pub async fn create_client(config: &MongoTargetConfig) -> Result<Client, DiagError> {
    let mut options = ClientOptions::parse(&config.connection_url)
        .await
        .map_err(|e| match e.kind.as_ref() {
            ErrorKind::InvalidArgument { .. } => {
                DiagError::Config(format!("Invalid MongoDB connection string: {e}"))
            }
            _ => classify("MongoDB connection string resolution", e),
        })?;
    options.app_name = Some(config.app_name.clone());
    options.connect_timeout = Some(config.connect_timeout);
    options.server_selection_timeout = Some(config.connect_timeout);
    if config.direct_connection {
        options.direct_connection = Some(true);
    }

    Client::with_options(options).map_err(|e| {
        DiagError::Connection(anyhow::anyhow!("MongoDB client setup failed: {e}"))
    })
}

/// Map a driver error onto the diagnostic taxonomy.
pub fn classify(context: &str, err: Error) -> DiagError {
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => {
            DiagError::Connection(anyhow::anyhow!("{context}: {err}"))
        }
        _ => DiagError::Other(anyhow::anyhow!("{context} failed: {err}")),
    }
}
