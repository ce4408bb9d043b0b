use derive_more::Display;

use crate::WorkloadError;

/// Table the companion server creates on startup.
pub const DEFAULT_TABLE: &str = "default_table";

/// Prefix of generated row keys.
pub const DEFAULT_KEY_PREFIX: &str = "key_";

/// One SQL statement sent on its own stream.
///
/// The text form is what goes on the wire, see the [`Display`] impl.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Statement {
    #[display("INSERT INTO {table} (id, counter) VALUES('{key}', {counter});")]
    Insert {
        table: String,
        key: String,
        counter: i64,
    },
    #[display("SELECT * FROM {table};")]
    Select { table: String },
}

impl Statement {
    pub fn is_insert(&self) -> bool {
        matches!(self, Statement::Insert { .. })
    }

    pub fn table(&self) -> &str {
        match self {
            Statement::Insert { table, .. } | Statement::Select { table } => table,
        }
    }
}

/// Table names are spliced into statement text unquoted.
pub(crate) fn validate_table(table: &str) -> Result<(), WorkloadError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(WorkloadError::InvalidTable(table.to_owned()))
    }
}

/// Keys are spliced between single quotes.
pub(crate) fn validate_key_prefix(prefix: &str) -> Result<(), WorkloadError> {
    if prefix.contains(['\'', '\\']) || prefix.chars().any(char::is_control) {
        return Err(WorkloadError::InvalidKeyPrefix(prefix.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_text() {
        let statement = Statement::Insert {
            table: DEFAULT_TABLE.to_owned(),
            key: "key_0".to_owned(),
            counter: 0,
        };
        assert_eq!(
            statement.to_string(),
            "INSERT INTO default_table (id, counter) VALUES('key_0', 0);"
        );
        assert!(statement.is_insert());
        assert_eq!(statement.table(), DEFAULT_TABLE);
    }

    #[test]
    fn select_text() {
        let statement = Statement::Select {
            table: DEFAULT_TABLE.to_owned(),
        };
        assert_eq!(statement.to_string(), "SELECT * FROM default_table;");
        assert!(!statement.is_insert());
    }

    #[test]
    fn table_names() {
        assert!(validate_table("default_table").is_ok());
        assert!(validate_table("_t1").is_ok());
        assert!(validate_table("").is_err());
        assert!(validate_table("1table").is_err());
        assert!(validate_table("t; DROP TABLE t").is_err());
    }

    #[test]
    fn key_prefixes() {
        assert!(validate_key_prefix("").is_ok());
        assert!(validate_key_prefix("user-").is_ok());
        assert!(validate_key_prefix("o'brien").is_err());
        assert!(validate_key_prefix("a\nb").is_err());
    }
}
