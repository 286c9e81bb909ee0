//! Query provider.
//!
//! Turns logical queries into commands through a [`QueryTranslator`] and runs
//! them on a connection it does not own.

use std::sync::{Arc, Weak};

use tracing::error;

use crate::command::{ExecutionContext, QueryCommand, QueryOutcome};
use crate::connection::{ConnectionId, DirectoryConnection};
use crate::error::Error;

/// Turns a logical query into a command carrying its options.
pub trait QueryTranslator<Q>: Send + Sync {
    /// Object type the commands materialize.
    type Object: Send + 'static;

    fn translate(&self, query: &Q) -> Result<Box<dyn QueryCommand<Self::Object>>, Error>;
}

/// Executes translated queries over a borrowed connection.
///
/// Only a weak handle to the connection is kept. Once the owner drops or
/// disposes it, every execution fails with [`Error::Disposed`].
pub struct DirectoryQueryProvider<C, T> {
    connection: Weak<C>,
    connection_id: ConnectionId,
    translator: T,
    context: ExecutionContext,
}

impl<C, T> DirectoryQueryProvider<C, T>
where
    C: DirectoryConnection + 'static,
{
    pub fn new(connection: &Arc<C>, translator: T) -> Self {
        Self {
            connection: Arc::downgrade(connection),
            connection_id: connection.id(),
            translator,
            context: ExecutionContext::default(),
        }
    }

    /// Replace the execution context (scope, paging, search base).
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// The connection, if its owner still holds it open.
    fn resolve(&self) -> Result<Arc<C>, Error> {
        self.connection
            .upgrade()
            .filter(|connection| !connection.is_disposed())
            .ok_or_else(|| Error::Disposed(format!("{} handle", self.connection_id)))
    }

    fn prepare<Q>(&self, query: &Q) -> Result<(Arc<C>, Box<dyn QueryCommand<T::Object>>), Error>
    where
        T: QueryTranslator<Q>,
    {
        let command = self.translator.translate(query)?;
        let connection = self.resolve()?;
        Ok((connection, command))
    }

    /// Execute a query, blocking for each round trip.
    pub fn execute<Q>(&self, query: &Q) -> Result<QueryOutcome<T::Object>, Error>
    where
        T: QueryTranslator<Q>,
    {
        let result = self.prepare(query).and_then(|(connection, command)| {
            command.execute(connection.as_ref(), &self.context)
        });
        result.inspect_err(|e| self.log_failure(e))
    }

    /// Execute a query without blocking.
    pub async fn execute_async<Q>(&self, query: &Q) -> Result<QueryOutcome<T::Object>, Error>
    where
        T: QueryTranslator<Q>,
    {
        let result = match self.prepare(query) {
            Ok((connection, command)) => {
                command
                    .execute_async(connection.as_ref(), &self.context)
                    .await
            }
            Err(e) => Err(e),
        };
        result.inspect_err(|e| self.log_failure(e))
    }

    fn log_failure(&self, e: &Error) {
        error!(connection = %self.connection_id, error = %e, "Directory query failed");
    }
}
