use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::{Opts, OptsBuilder};
use tidepool_connection::{ConnectionFactory, ConnectionParams};
use tidepool_core::{Connection, Result};

use crate::MySqlConnection;

/// Opens MySQL sessions for a connection pool
#[derive(Clone)]
pub struct MySqlConnector {
    opts: Opts,
}

impl MySqlConnector {
    pub fn new(params: &ConnectionParams) -> Self {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(params.host.clone())
            .tcp_port(params.port)
            .user(Some(params.user.clone()));

        if let Some(password) = &params.password {
            builder = builder.pass(Some(password.clone()));
        }
        if let Some(database) = &params.database {
            builder = builder.db_name(Some(database.clone()));
        }

        Self {
            opts: builder.into(),
        }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }
}

impl std::fmt::Debug for MySqlConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnector")
            .field("host", &self.opts.ip_or_hostname())
            .field("port", &self.opts.tcp_port())
            .field("user", &self.opts.user())
            .field("database", &self.opts.db_name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConnectionFactory for MySqlConnector {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let conn = MySqlConnection::connect(self.opts.clone()).await?;
        Ok(Arc::new(conn))
    }
}
