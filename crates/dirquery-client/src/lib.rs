//! dirquery client - query execution engine for LDAP directories.
//!
//! Runs directory queries over paged results, virtual list views and
//! attribute range retrieval, on pooled connections.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use dirquery_client::{
//!     CommandKind, ConnectionConfig, ConnectionPool, EntryMapping, ExecutionContext,
//!     LdapConnectionFactory, PoolConfig, QueryCommand, QueryOptions,
//! };
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("ldaps://dc01.example.com");
//!     let factory = LdapConnectionFactory::new(config, tokio::runtime::Handle::current())?;
//!     let pool = ConnectionPool::new(factory, PoolConfig::new(1, 4))?;
//!
//!     let connection = pool.get_connection()?;
//!     let mapping = Arc::new(EntryMapping::new("DC=example,DC=com"));
//!     let command = CommandKind::List.build(QueryOptions::new("(objectClass=user)"), mapping);
//!
//!     let users = command
//!         .execute_async(connection.as_ref(), &ExecutionContext::default())
//!         .await?;
//!     println!("{:?}", users);
//!
//!     pool.release_connection(connection);
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod options;
pub mod pool;
pub mod provider;
pub mod range;

#[cfg(test)]
pub(crate) mod test_support;

pub use command::{CommandKind, ExecutionContext, QueryCommand, QueryOutcome};
pub use config::{ConnectionConfig, Credentials, ServerAddress};
pub use connection::{
    ConnectionBuilder, ConnectionId, ConnectionState, DirectoryConnection, LdapConnection,
    LdapConnectionFactory,
};
pub use error::Error;
pub use options::{EntryMapping, LdapPage, ObjectMapping, PagingOptions, QueryOptions, VirtualListView};
pub use pool::{ConnectionPool, PoolConfig};
pub use provider::{DirectoryQueryProvider, QueryTranslator};
pub use range::{retrieve_ranges, retrieve_ranges_async, RangeRetrieval};

/// Re-export protocol types.
pub use dirquery_proto as proto;
