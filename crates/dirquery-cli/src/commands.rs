//! Subcommands and their translation into query commands.

use std::sync::Arc;

use clap::{Args, Subcommand};

use dirquery_client::{
    CommandKind, EntryMapping, Error, PagingOptions, QueryCommand, QueryOptions, QueryTranslator,
};
use dirquery_proto::{Control, SearchEntry, SortKey, VlvControl};

/// Options shared by every search subcommand.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// LDAP filter
    #[arg(default_value = "(objectClass=*)")]
    pub filter: String,

    /// Attributes to return (comma separated)
    #[arg(short = 'a', long, value_delimiter = ',')]
    pub attributes: Vec<String>,

    /// Server-side sort attribute
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort in descending order
    #[arg(long, requires = "sort")]
    pub descending: bool,
}

impl SearchArgs {
    fn options(&self) -> QueryOptions {
        let mut options =
            QueryOptions::new(self.filter.clone()).with_attributes(self.attributes.clone());
        if let Some(attribute) = &self.sort {
            options = options.with_sort(if self.descending {
                SortKey::descending(attribute.clone())
            } else {
                SortKey::ascending(attribute.clone())
            });
        }
        options
    }
}

/// What to run.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List every matching entry
    List {
        #[command(flatten)]
        search: SearchArgs,
        /// Stop after this many entries
        #[arg(long)]
        take: Option<u32>,
        /// Skip this many entries (requires --sort)
        #[arg(long)]
        skip: Option<u32>,
        /// Send a single request even when paging is enabled
        #[arg(long)]
        no_paging: bool,
    },

    /// Fetch one page and print the cookie to resume from
    Page {
        #[command(flatten)]
        search: SearchArgs,
        /// Entries per page
        #[arg(long, default_value_t = 100)]
        size: u32,
        /// Hex cookie printed by the previous page
        #[arg(long)]
        cookie: Option<String>,
    },

    /// Fetch a virtual list view window (requires --sort)
    Window {
        #[command(flatten)]
        search: SearchArgs,
        /// One-based offset of the first entry
        #[arg(long, default_value_t = 1)]
        offset: u32,
        /// Entries to return after the first one
        #[arg(long, default_value_t = 9)]
        after: u32,
    },

    /// Count matching entries
    Count {
        #[command(flatten)]
        search: SearchArgs,
    },

    /// Report whether anything matches
    Exists {
        #[command(flatten)]
        search: SearchArgs,
    },

    /// Print the first matching entry
    First {
        #[command(flatten)]
        search: SearchArgs,
        /// Print nothing instead of failing when nothing matches
        #[arg(long)]
        or_default: bool,
    },

    /// Print the only matching entry
    Single {
        #[command(flatten)]
        search: SearchArgs,
        /// Print nothing instead of failing when nothing matches
        #[arg(long)]
        or_default: bool,
    },

    /// Retrieve every value of a large multi-valued attribute
    Range {
        /// Entry holding the attribute
        dn: String,
        /// Attribute name, e.g. member
        attribute: String,
        /// First value offset
        #[arg(long, default_value_t = 0)]
        start: usize,
    },

    /// Print the request a list would send, without sending it
    Request {
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        take: Option<u32>,
        #[arg(long)]
        skip: Option<u32>,
    },
}

/// Translates subcommands into commands over raw entries.
#[derive(Clone)]
pub struct CliTranslator {
    mapping: Arc<EntryMapping>,
}

impl CliTranslator {
    pub fn new(naming_context: impl Into<String>) -> Self {
        Self {
            mapping: Arc::new(EntryMapping::new(naming_context)),
        }
    }

    /// Options and intent for a search subcommand; `None` for `range`.
    pub fn plan(&self, command: &Command) -> Result<Option<(CommandKind, QueryOptions)>, Error> {
        let planned = match command {
            Command::List {
                search,
                take,
                skip,
                no_paging,
            } => {
                let mut options = search.options();
                if let Some(take) = take {
                    options = options.with_take(*take);
                }
                if let Some(skip) = skip {
                    options = options.with_skip(*skip);
                }
                if *no_paging {
                    options = options.without_paging();
                }
                (CommandKind::List, options)
            }
            Command::Page {
                search,
                size,
                cookie,
            } => {
                let cookie = match cookie {
                    Some(cookie) => hex::decode(cookie).map_err(|e| {
                        Error::Configuration(format!("invalid page cookie '{}': {}", cookie, e))
                    })?,
                    None => Vec::new(),
                };
                let options = search
                    .options()
                    .with_paging_options(PagingOptions::resume(*size, cookie));
                (CommandKind::List, options)
            }
            Command::Window {
                search,
                offset,
                after,
            } => {
                let options = search
                    .options()
                    .with_control(Control::Vlv(VlvControl::at_offset(*offset, *after)));
                (CommandKind::List, options)
            }
            Command::Count { search } => (CommandKind::Count, search.options()),
            Command::Exists { search } => (CommandKind::Any, search.options()),
            Command::First { search, or_default } => {
                let kind = if *or_default {
                    CommandKind::FirstOrDefault
                } else {
                    CommandKind::First
                };
                (kind, search.options())
            }
            Command::Single { search, or_default } => {
                let kind = if *or_default {
                    CommandKind::SingleOrDefault
                } else {
                    CommandKind::Single
                };
                (kind, search.options())
            }
            Command::Request { search, take, skip } => {
                let mut options = search.options();
                if let Some(take) = take {
                    options = options.with_take(*take);
                }
                if let Some(skip) = skip {
                    options = options.with_skip(*skip);
                }
                (CommandKind::GetRequest, options)
            }
            Command::Range { .. } => return Ok(None),
        };
        Ok(Some(planned))
    }
}

impl QueryTranslator<Command> for CliTranslator {
    type Object = SearchEntry;

    fn translate(&self, command: &Command) -> Result<Box<dyn QueryCommand<SearchEntry>>, Error> {
        match self.plan(command)? {
            Some((kind, options)) => Ok(kind.build(options, self.mapping.clone())),
            None => Err(Error::Configuration(
                "range retrieval is not a search query".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(filter: &str) -> SearchArgs {
        SearchArgs {
            filter: filter.to_string(),
            attributes: vec!["cn".to_string()],
            sort: Some("sn".to_string()),
            descending: true,
        }
    }

    #[test]
    fn test_list_translation() {
        let translator = CliTranslator::new("DC=test");
        let (kind, options) = translator
            .plan(&Command::List {
                search: search("(cn=a*)"),
                take: Some(5),
                skip: Some(2),
                no_paging: true,
            })
            .unwrap()
            .unwrap();

        assert_eq!(kind, CommandKind::List);
        assert_eq!(options.filter, "(cn=a*)");
        assert_eq!(options.take_size, Some(5));
        assert_eq!(options.skip_size, Some(2));
        assert!(options.without_paging);
        assert_eq!(options.sort_keys, vec![SortKey::descending("sn")]);
    }

    #[test]
    fn test_page_cookie_is_hex() {
        let translator = CliTranslator::new("DC=test");
        let (_, options) = translator
            .plan(&Command::Page {
                search: search("(cn=*)"),
                size: 10,
                cookie: Some("0a0b".to_string()),
            })
            .unwrap()
            .unwrap();
        assert_eq!(options.paging_options, Some(PagingOptions::resume(10, vec![0x0a, 0x0b])));

        let err = translator
            .plan(&Command::Page {
                search: search("(cn=*)"),
                size: 10,
                cookie: Some("zz".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_or_default_variants() {
        let translator = CliTranslator::new("DC=test");
        let (kind, _) = translator
            .plan(&Command::Single {
                search: search("(cn=x)"),
                or_default: true,
            })
            .unwrap()
            .unwrap();
        assert_eq!(kind, CommandKind::SingleOrDefault);
    }

    #[test]
    fn test_range_is_not_translated() {
        let translator = CliTranslator::new("DC=test");
        let command = Command::Range {
            dn: "CN=g".to_string(),
            attribute: "member".to_string(),
            start: 0,
        };
        assert!(translator.plan(&command).unwrap().is_none());
        assert!(translator.translate(&command).is_err());
    }
}
