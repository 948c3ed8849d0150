//! MongoDB connection management with pool configuration and lifecycle events
//!
//! A [`Connection`] is constructed explicitly and passed to whoever needs it;
//! there is no process-wide connection. Lifecycle transitions are published
//! on a broadcast channel so observers can log them without taking part in
//! connection handling.

use crate::{DocMapError, Result};
use bson::doc;
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Database,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 5)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 20)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(5),
            max_pool_size: Some(20),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("docmap".to_string()),
        }
    }
}

impl PoolConfig {
    fn apply(self, client_options: &mut ClientOptions) {
        if let Some(min) = self.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = self.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = self.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = self.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = self.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = self.app_name {
            client_options.app_name = Some(app);
        }
    }
}

/// Connection lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { database: String },
    Error { message: String },
    Disconnected { database: String },
}

/// Broadcast channel for [`ConnectionEvent`]s
///
/// Create it before connecting so subscribers see the initial `Connected`
/// or `Error` event. Sending never fails; events with no subscriber are
/// dropped.
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    sender: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for ConnectionEvents {
    fn default() -> Self {
        Self::new(16)
    }
}

/// MongoDB connection manager with pooling support
pub struct Connection {
    client: Client,
    database: Database,
    database_name: String,
    events: ConnectionEvents,
}

impl Connection {
    /// Connect with default pool settings and a private event channel
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::connect(connection_string, PoolConfig::default(), ConnectionEvents::default()).await
    }

    /// Parse the URL, apply the pool configuration and ping the server
    ///
    /// Emits `Connected` on success and `Error` on any failure.
    pub async fn connect(
        connection_string: &str,
        config: PoolConfig,
        events: ConnectionEvents,
    ) -> Result<Self> {
        match Self::establish(connection_string, config).await {
            Ok((client, database)) => {
                let database_name = database.name().to_string();
                info!(database = %database_name, "Connected to MongoDB");
                events.emit(ConnectionEvent::Connected {
                    database: database_name.clone(),
                });
                Ok(Self {
                    client,
                    database,
                    database_name,
                    events,
                })
            }
            Err(e) => {
                warn!(error = %e, "MongoDB connection failed");
                events.emit(ConnectionEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn establish(connection_string: &str, config: PoolConfig) -> Result<(Client, Database)> {
        let mut client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| DocMapError::Connection(format!("Invalid connection string: {}", e)))?;
        config.apply(&mut client_options);

        // Set stable API version for compatibility
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)
            .map_err(|e| DocMapError::Connection(e.to_string()))?;

        let database = client.default_database().ok_or_else(|| {
            DocMapError::Connection("No default database specified in connection string".to_string())
        })?;

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocMapError::Connection(format!("Ping failed: {}", e)))?;

        Ok((client, database))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn events(&self) -> &ConnectionEvents {
        &self.events
    }

    /// Drop the current database (use with caution!)
    pub async fn drop_database(&self) -> Result<()> {
        self.database.drop().await?;
        Ok(())
    }

    /// Shut the client down and emit `Disconnected`
    pub async fn close(self) {
        self.client.shutdown().await;
        info!(database = %self.database_name, "Disconnected from MongoDB");
        self.events.emit(ConnectionEvent::Disconnected {
            database: self.database_name,
        });
    }
}
