//! Query execution.

use std::slice;

use thiserror::Error;
use tracing::debug;

use dirquery_client::{
    retrieve_ranges, ConnectionBuilder, ConnectionPool, DirectoryConnection, DirectoryQueryProvider,
    ExecutionContext, QueryOutcome,
};
use dirquery_proto::SearchEntry;

use crate::commands::{CliTranslator, Command};
use crate::formatter::Formatter;

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Client or server error.
    #[error("{0}")]
    Client(#[from] dirquery_client::Error),

    /// Unreadable settings file.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pool plus everything needed to turn subcommands into searches.
pub struct Session<B: ConnectionBuilder> {
    pool: ConnectionPool<B>,
    translator: CliTranslator,
    context: ExecutionContext,
}

impl<B: ConnectionBuilder> Session<B> {
    pub fn new(pool: ConnectionPool<B>, translator: CliTranslator, context: ExecutionContext) -> Self {
        Self {
            pool,
            translator,
            context,
        }
    }

    /// Run one subcommand on a pooled connection and format the result.
    pub fn execute(&self, command: &Command, formatter: &dyn Formatter) -> Result<String, ExecuteError> {
        let connection = self.pool.get_connection()?;
        debug!(id = %connection.id(), "Running command");

        let result = match command {
            Command::Range {
                dn,
                attribute,
                start,
            } => retrieve_ranges(connection.as_ref(), dn, attribute, *start)
                .map(|values| formatter.format_values(attribute, &values)),
            _ => DirectoryQueryProvider::new(&connection, self.translator.clone())
                .with_context(self.context.clone())
                .execute(command)
                .map(|outcome| format_outcome(outcome, formatter)),
        };

        self.pool.release_connection(connection);
        result.map_err(Into::into)
    }

    /// Close every connection.
    pub fn close(&self) {
        self.pool.dispose();
    }
}

/// Render any command result.
pub fn format_outcome(outcome: QueryOutcome<SearchEntry>, formatter: &dyn Formatter) -> String {
    match outcome {
        QueryOutcome::Exists(exists) => formatter.format_exists(exists),
        QueryOutcome::Count(count) => formatter.format_count(count as u64),
        QueryOutcome::LongCount(count) => formatter.format_count(count),
        QueryOutcome::Object(Some(entry)) => formatter.format_entries(slice::from_ref(&entry)),
        QueryOutcome::Object(None) => formatter.format_entries(&[]),
        QueryOutcome::List(entries) => formatter.format_entries(&entries),
        QueryOutcome::Page(page) => formatter.format_page(&page),
        QueryOutcome::Window(window) => formatter.format_window(&window),
        QueryOutcome::Request(request) => formatter.format_request(&request),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{CsvFormatter, JsonFormatter};

    #[test]
    fn test_format_counts() {
        assert_eq!(format_outcome(QueryOutcome::Count(3), &CsvFormatter), "count\n3");
        assert_eq!(
            format_outcome(QueryOutcome::LongCount(4), &JsonFormatter),
            r#"{"count":4}"#
        );
        assert_eq!(
            format_outcome(QueryOutcome::Exists(true), &JsonFormatter),
            r#"{"exists":true}"#
        );
    }

    #[test]
    fn test_format_single_object() {
        let entry = SearchEntry::new("CN=Ada,DC=test").with_attribute("cn", ["Ada"]);
        let output = format_outcome(QueryOutcome::Object(Some(entry)), &CsvFormatter);
        assert_eq!(output, "dn,cn\n\"CN=Ada,DC=test\",Ada\n");

        let output = format_outcome(QueryOutcome::Object(None), &CsvFormatter);
        assert_eq!(output, "dn\n");
    }
}
