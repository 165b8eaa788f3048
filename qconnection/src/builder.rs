use std::sync::Arc;

use qbase::{config::Config, role::Role};
use qcongestion::Algorithm;
use tracing::Instrument as _;

use crate::{
    conn::RawConnection,
    connection::{Connection, Shared, now},
    crypto::Crypto,
    driver::drive,
    transport::Transport,
};

/// Sets up a [`Connection`] before its driver starts.
///
/// ```no_run
/// # async fn demo() {
/// use qbase::config::Config;
/// use qconnection::{Connection, PlainCrypto, pipe};
///
/// let config = Config::default();
/// let (client_end, server_end) = pipe::pair(pipe::LinkConditions::perfect());
/// let client = Connection::new_client(config.clone())
///     .run(PlainCrypto::new(config.parameters()), client_end);
/// let server = Connection::new_server(config.clone())
///     .run(PlainCrypto::new(config.parameters()), server_end);
/// client.handshake_complete().await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionBuilder {
    role: Role,
    config: Config,
    algorithm: Option<Box<dyn Algorithm>>,
}

impl ConnectionBuilder {
    pub(crate) fn new(role: Role, config: Config) -> Self {
        Self {
            role,
            config,
            algorithm: None,
        }
    }

    /// Use `algorithm` for congestion control instead of NewReno.
    pub fn with_algorithm(mut self, algorithm: impl Algorithm + 'static) -> Self {
        self.algorithm = Some(Box::new(algorithm));
        self
    }

    /// Spawn the driver on the current tokio runtime.
    ///
    /// The client starts the handshake right away.
    pub fn run(self, crypto: impl Crypto, transport: impl Transport) -> Connection {
        let crypto = Box::new(crypto);
        let engine = match self.algorithm {
            Some(algorithm) => {
                RawConnection::with_algorithm(self.role, self.config, crypto, algorithm, now())
            }
            None => RawConnection::new(self.role, self.config, crypto, now()),
        };
        let span = tracing::debug_span!("connection", role = %self.role);
        let shared = Arc::new(Shared::new(engine));
        tokio::spawn(drive(shared.clone(), transport).instrument(span));
        Connection::from_shared(shared)
    }
}
