use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The kinds of command understood by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `addItem('key', 'value')`
    Add,

    /// `deleteItem('key')`
    Delete,

    /// `getItem('key')`
    Get,

    /// `getAllItems()`
    GetAll,
}

impl Kind {
    /// The keyword naming this kind in the textual format.
    pub fn keyword(self) -> &'static str {
        match self {
            Kind::Add => "addItem",
            Kind::Delete => "deleteItem",
            Kind::Get => "getItem",
            Kind::GetAll => "getAllItems",
        }
    }

    /// The exact number of arguments a command of this kind takes.
    pub fn arity(self) -> usize {
        match self {
            Kind::Add => 2,
            Kind::Delete | Kind::Get => 1,
            Kind::GetAll => 0,
        }
    }

    /// Match a keyword (case-sensitively). Unknown keywords have no kind.
    fn from_keyword(keyword: &str) -> Option<Kind> {
        match keyword {
            "addItem" => Some(Kind::Add),
            "deleteItem" => Some(Kind::Delete),
            "getItem" => Some(Kind::Get),
            "getAllItems" => Some(Kind::GetAll),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A validated command.
///
/// The variants fix the number of arguments for each kind, so a `Command` with the wrong arity
/// cannot exist. Commands are produced by [`Command::parse`] or by the checked constructors, and
/// render back to text with `Display`:
///
/// ```
/// use cq::Command;
///
/// let command = Command::parse("addItem( 'fruit' , 'apple' )").unwrap();
/// assert_eq!(command, Command::add("fruit", "apple").unwrap());
/// assert_eq!(command.to_string(), "addItem('fruit', 'apple')");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Insert or update `key`.
    Add {
        /// The key to set.
        key: String,

        /// The value to set for the key.
        value: String,
    },

    /// Remove `key`, if present.
    Delete {
        /// The key to remove.
        key: String,
    },

    /// Write the value of `key` to the sink.
    Get {
        /// The key to look up.
        key: String,
    },

    /// Write every entry, in store order, to the sink.
    GetAll,
}

impl Command {
    /// Parse a line of text into a command.
    ///
    /// The keyword is everything before the first `(`, with surrounding whitespace removed. The
    /// arguments are the text between the first `(` and the following `)`, split on `,`, with
    /// whitespace and then `'` characters trimmed from each token. Tokens left empty are dropped.
    /// A line without parentheses has no arguments.
    ///
    /// Quoted arguments containing `,`, `(` or `)` are not supported.
    pub fn parse(line: &str) -> Result<Command> {
        let keyword = line.split('(').next().unwrap_or_default().trim();
        let kind = Kind::from_keyword(keyword).ok_or_else(|| invalid(line))?;

        let args = split_args(line);
        let command = match (kind, args.as_slice()) {
            (Kind::Add, [key, value]) => Command::Add {
                key: key.to_string(),
                value: value.to_string(),
            },
            (Kind::Delete, [key]) => Command::Delete {
                key: key.to_string(),
            },
            (Kind::Get, [key]) => Command::Get {
                key: key.to_string(),
            },
            (Kind::GetAll, []) => Command::GetAll,
            _ => return Err(invalid(line)),
        };
        Ok(command)
    }

    /// Construct an `addItem` command.
    ///
    /// Fails with [`Error::InvalidCommand`] if either argument can't be carried by the textual
    /// format (see [`Command::parse`]).
    pub fn add<K: Into<String>, V: Into<String>>(key: K, value: V) -> Result<Command> {
        checked(Command::Add {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Construct a `deleteItem` command.
    pub fn delete<K: Into<String>>(key: K) -> Result<Command> {
        checked(Command::Delete { key: key.into() })
    }

    /// Construct a `getItem` command.
    pub fn get<K: Into<String>>(key: K) -> Result<Command> {
        checked(Command::Get { key: key.into() })
    }

    /// Construct a `getAllItems` command.
    pub fn get_all() -> Command {
        Command::GetAll
    }

    /// The kind of this command.
    pub fn kind(&self) -> Kind {
        match self {
            Command::Add { .. } => Kind::Add,
            Command::Delete { .. } => Kind::Delete,
            Command::Get { .. } => Kind::Get,
            Command::GetAll => Kind::GetAll,
        }
    }

    /// The key this command targets, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::Add { key, .. } | Command::Delete { key } | Command::Get { key } => {
                Some(key.as_str())
            }
            Command::GetAll => None,
        }
    }

    /// The positional arguments, in order.
    pub fn args(&self) -> Vec<&str> {
        match self {
            Command::Add { key, value } => vec![key.as_str(), value.as_str()],
            Command::Delete { key } | Command::Get { key } => vec![key.as_str()],
            Command::GetAll => vec![],
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let args = self.args();
        if args.is_empty() {
            write!(f, "{}()", self.kind())
        } else {
            write!(f, "{}('{}')", self.kind(), args.join("', '"))
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Command> {
        Command::parse(line)
    }
}

fn invalid(line: &str) -> Error {
    Error::InvalidCommand(line.to_owned())
}

fn split_args(line: &str) -> Vec<&str> {
    let inner = match line.split('(').nth(1) {
        Some(inner) => inner,
        None => return Vec::new(),
    };
    inner
        .split(')')
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|token| token.trim().trim_matches('\''))
        .filter(|token| !token.is_empty())
        .collect()
}

/// Reject arguments that would not survive a render/parse round trip.
fn checked(command: Command) -> Result<Command> {
    let representable = |arg: &str| {
        !arg.is_empty()
            && !arg.contains(|c: char| c == ',' || c == '(' || c == ')')
            && !arg.starts_with('\'')
            && !arg.ends_with('\'')
    };
    if command.args().into_iter().all(representable) {
        Ok(command)
    } else {
        Err(invalid(&command.to_string()))
    }
}
