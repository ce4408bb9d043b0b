use std::{borrow::Cow, iter::FusedIterator, str::FromStr};

use bytes::Bytes;
use derive_more::Display;
use getset::{CopyGetters, Getters};

use crate::{
    WorkloadError,
    statement::{self, DEFAULT_KEY_PREFIX, DEFAULT_TABLE, Statement},
};

/// Which statements a workload emits.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mix {
    /// INSERT on even indices, SELECT on odd ones.
    #[default]
    #[display("alternate")]
    Alternate,
    #[display("insert-only")]
    InsertOnly,
    #[display("select-only")]
    SelectOnly,
}

impl Mix {
    pub const VARIANTS: [Mix; 3] = [Mix::Alternate, Mix::InsertOnly, Mix::SelectOnly];

    fn is_insert(self, index: u64) -> bool {
        match self {
            Mix::Alternate => index % 2 == 0,
            Mix::InsertOnly => true,
            Mix::SelectOnly => false,
        }
    }
}

impl FromStr for Mix {
    type Err = WorkloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mix::VARIANTS
            .into_iter()
            .find(|mix| mix.to_string() == s)
            .ok_or_else(|| WorkloadError::UnknownMix(s.to_owned()))
    }
}

/// A statement ready to be written to a stream.
#[derive(Getters, CopyGetters, Debug, Clone, PartialEq, Eq)]
pub struct Request {
    #[getset(get_copy = "pub")]
    index: u64,
    #[getset(get = "pub")]
    statement: Statement,
    #[getset(get = "pub")]
    payload: Bytes,
}

impl Request {
    pub fn new(index: u64, statement: Statement) -> Self {
        let payload = Bytes::from(statement.to_string());
        Self {
            index,
            statement,
            payload,
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Describes the statements to send, indexed from [`Workload::start`].
///
/// # Examples
/// ```
/// use qworkload::Workload;
///
/// let texts = Workload::default()
///     .requests()
///     .take(2)
///     .map(|request| request.text().into_owned())
///     .collect::<Vec<_>>();
/// assert_eq!(
///     texts,
///     [
///         "INSERT INTO default_table (id, counter) VALUES('key_0', 0);",
///         "SELECT * FROM default_table;",
///     ]
/// );
/// ```
#[derive(Getters, CopyGetters, Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    #[getset(get = "pub")]
    table: String,
    #[getset(get = "pub")]
    key_prefix: String,
    #[getset(get_copy = "pub")]
    mix: Mix,
    #[getset(get_copy = "pub")]
    start: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_owned(),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            mix: Mix::default(),
            start: 0,
        }
    }
}

impl Workload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self, WorkloadError> {
        let table = table.into();
        statement::validate_table(&table)?;
        self.table = table;
        Ok(self)
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Result<Self, WorkloadError> {
        let prefix = prefix.into();
        statement::validate_key_prefix(&prefix)?;
        self.key_prefix = prefix;
        Ok(self)
    }

    pub fn with_mix(mut self, mix: Mix) -> Self {
        self.mix = mix;
        self
    }

    pub fn starting_at(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    pub fn statement(&self, index: u64) -> Statement {
        if self.mix.is_insert(index) {
            Statement::Insert {
                table: self.table.clone(),
                key: format!("{}{index}", self.key_prefix),
                counter: 0,
            }
        } else {
            Statement::Select {
                table: self.table.clone(),
            }
        }
    }

    pub fn request(&self, index: u64) -> Request {
        Request::new(index, self.statement(index))
    }

    /// A fresh sequence from [`Workload::start`]. Every call starts over.
    pub fn requests(&self) -> Requests {
        Requests {
            workload: self.clone(),
            next: Some(self.start),
        }
    }
}

/// Lazy, unbounded sequence of requests. Ends only when the index would overflow.
#[derive(Debug, Clone)]
pub struct Requests {
    workload: Workload,
    next: Option<u64>,
}

impl Requests {
    /// Index of the request the next call to `next` yields.
    pub fn peek_index(&self) -> Option<u64> {
        self.next
    }
}

impl Iterator for Requests {
    type Item = Request;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        self.next = index.checked_add(1);
        Some(self.workload.request(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            Some(next) => {
                let remaining = u64::MAX - next;
                match usize::try_from(remaining).ok().and_then(|r| r.checked_add(1)) {
                    Some(remaining) => (remaining, Some(remaining)),
                    None => (usize::MAX, None),
                }
            }
            None => (0, Some(0)),
        }
    }
}

impl FusedIterator for Requests {}
