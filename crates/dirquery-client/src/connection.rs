//! Connection management for the directory client.
//!
//! [`DirectoryConnection`] is the seam between the query engine and the wire:
//! commands only ever talk to a connection through it. [`LdapConnection`] is
//! the `ldap3`-backed implementation handed out by [`LdapConnectionFactory`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchOptions, SearchResult};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use dirquery_proto::{
    RawControl, ResponseControl, ResultCode, SearchEntry, SearchRequest, SearchResponse,
    SearchScope,
};

use crate::config::{ConnectionConfig, ServerAddress};
use crate::error::Error;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection #{}", self.0)
    }
}

/// A transport able to run search requests.
///
/// Both paths must report the server's result code rather than turning a
/// non-success code into an error; the engine decides what is fatal.
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    /// Identifier used for logging and pool bookkeeping.
    fn id(&self) -> ConnectionId;

    /// Send a request and block until the response arrives.
    fn send_request(&self, request: &SearchRequest) -> Result<SearchResponse, Error>;

    /// Send a request without blocking the calling thread.
    async fn send_request_async(&self, request: &SearchRequest) -> Result<SearchResponse, Error>;

    /// Close the connection. Idempotent.
    fn dispose(&self);

    /// True once [`dispose`](Self::dispose) has run.
    fn is_disposed(&self) -> bool;
}

/// Builds new connections for a pool.
pub trait ConnectionBuilder: Send + Sync + 'static {
    type Connection: DirectoryConnection + 'static;

    /// Open a new connection.
    fn build(&self) -> Result<Self::Connection, Error>;
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Bound and ready for requests.
    Ready,
    /// Connection closed.
    Closed,
}

/// A connection to an LDAP server.
pub struct LdapConnection {
    id: ConnectionId,
    address: ServerAddress,
    ldap: ldap3::Ldap,
    runtime: Handle,
    timeout: Duration,
    state: Mutex<ConnectionState>,
}

impl LdapConnection {
    /// Connect, spawn the connection driver on `runtime` and bind.
    pub async fn establish(
        address: ServerAddress,
        config: &ConnectionConfig,
        runtime: Handle,
    ) -> Result<Self, Error> {
        let url = address.url();
        let id = ConnectionId::next();

        debug!(%id, url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.timeout())
            .set_starttls(config.use_starttls && !address.use_ssl)
            .set_no_tls_verify(config.no_tls_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| Error::Connection(format!("failed to connect to {}: {}", url, e)))?;

        runtime.spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(%id, error = %e, "LDAP connection driver error");
            }
        });

        if let Some(credentials) = &config.credentials {
            debug!(%id, bind_dn = %credentials.bind_dn, "Performing LDAP bind");

            let result = ldap
                .simple_bind(&credentials.bind_dn, &credentials.password)
                .await
                .map_err(|e| {
                    Error::Connection(format!("bind failed for {}: {}", credentials.bind_dn, e))
                })?;

            if result.rc != 0 {
                return Err(Error::server(ResultCode(result.rc), result.text));
            }
        }

        info!(%id, host = %address.host, port = address.port, ssl = address.use_ssl, "LDAP connection established");

        Ok(Self {
            id,
            address,
            ldap,
            runtime,
            timeout: config.timeout(),
            state: Mutex::new(ConnectionState::Ready),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Address this connection was opened against.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Closed => Err(Error::Disposed(self.id.to_string())),
        }
    }
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_request(&self, request: &SearchRequest) -> Result<SearchResponse, Error> {
        let _guard = self.runtime.enter();
        futures::executor::block_on(self.send_request_async(request))
    }

    async fn send_request_async(&self, request: &SearchRequest) -> Result<SearchResponse, Error> {
        self.ensure_ready()?;

        let controls: Vec<ldap3::controls::RawControl> = request
            .controls()
            .iter()
            .map(|control| control.encode().map(into_ldap3_control))
            .collect::<Result<_, _>>()?;

        let mut ldap = self.ldap.clone();
        ldap.with_timeout(self.timeout);
        if !controls.is_empty() {
            ldap.with_controls(controls);
        }
        if request.types_only {
            ldap.with_search_options(SearchOptions::new().typesonly(true));
        }

        let SearchResult(entries, result) = ldap
            .search(
                &request.base_dn,
                into_ldap3_scope(request.scope),
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(|e| Error::Connection(format!("search on {} failed: {}", self.id, e)))?;

        let entries = entries
            .into_iter()
            .filter(|entry| !entry.is_ref())
            .map(|entry| from_ldap3_entry(ldap3::SearchEntry::construct(entry)))
            .collect();

        let controls = result
            .ctrls
            .into_iter()
            .map(|control| {
                let raw = control.1;
                ResponseControl::decode(RawControl {
                    oid: raw.ctype,
                    critical: raw.crit,
                    value: raw.val,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchResponse {
            result_code: ResultCode(result.rc),
            matched_dn: result.matched,
            diagnostic_message: result.text,
            entries,
            controls,
        })
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Closed {
            return;
        }
        *state = ConnectionState::Closed;

        let id = self.id;
        let mut ldap = self.ldap.clone();
        self.runtime.spawn(async move {
            if let Err(e) = ldap.unbind().await {
                debug!(%id, error = %e, "Unbind failed while disposing connection");
            }
        });
        debug!(%id, "Connection disposed");
    }

    fn is_disposed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }
}

impl fmt::Debug for LdapConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConnection")
            .field("id", &self.id)
            .field("address", &self.address.url())
            .field("state", &self.state())
            .finish()
    }
}

fn into_ldap3_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn into_ldap3_control(raw: RawControl) -> ldap3::controls::RawControl {
    ldap3::controls::RawControl {
        ctype: raw.oid,
        crit: raw.critical,
        val: raw.value,
    }
}

fn from_ldap3_entry(entry: ldap3::SearchEntry) -> SearchEntry {
    SearchEntry {
        dn: entry.dn,
        attributes: entry.attrs.into_iter().collect(),
        binary_attributes: entry.bin_attrs.into_iter().collect(),
    }
}

/// Opens [`LdapConnection`]s against one server.
///
/// The server string is parsed once, when the factory is created.
#[derive(Debug, Clone)]
pub struct LdapConnectionFactory {
    address: ServerAddress,
    config: ConnectionConfig,
    runtime: Handle,
}

impl LdapConnectionFactory {
    /// Create a factory. `runtime` must belong to a multi-threaded runtime;
    /// connection drivers run on it and the blocking paths wait on it.
    pub fn new(config: ConnectionConfig, runtime: Handle) -> Result<Self, Error> {
        let address = ServerAddress::parse(&config.server)?;
        Ok(Self {
            address,
            config,
            runtime,
        })
    }

    /// Parsed server address.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Open a connection without blocking.
    pub async fn connect(&self) -> Result<LdapConnection, Error> {
        LdapConnection::establish(self.address.clone(), &self.config, self.runtime.clone()).await
    }
}

impl ConnectionBuilder for LdapConnectionFactory {
    type Connection = LdapConnection;

    fn build(&self) -> Result<LdapConnection, Error> {
        let _guard = self.runtime.enter();
        futures::executor::block_on(self.connect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
        assert!(a.to_string().starts_with("connection #"));
    }

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(into_ldap3_scope(SearchScope::Base), Scope::Base));
        assert!(matches!(into_ldap3_scope(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(into_ldap3_scope(SearchScope::Subtree), Scope::Subtree));
    }

    #[test]
    fn test_control_lowering_keeps_oid() {
        let raw = into_ldap3_control(
            dirquery_proto::Control::Paging(dirquery_proto::PageControl::new(50))
                .encode()
                .unwrap(),
        );
        assert_eq!(raw.ctype, dirquery_proto::controls::PAGED_RESULTS_OID);
        assert!(raw.crit);
        assert!(raw.val.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_factory_rejects_container_suffix() {
        let config = ConnectionConfig::new("ldap://dc01/DC=example,DC=com");
        let err = LdapConnectionFactory::new(config, Handle::current()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
