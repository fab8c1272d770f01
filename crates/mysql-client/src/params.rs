//! Query parameters and placeholder scanning.
//!
//! Statements may mix positional `?` placeholders with named `:name`
//! placeholders. The scanner rewrites named placeholders to `?` before the
//! SQL is sent to the server and records which slot each name fills.
//! Quoted strings, quoted identifiers and comments are skipped.
//!
//! ```text
//! SELECT * FROM t WHERE a = ? AND b = :name
//!                           |           |
//!                        slot 0      slot 1
//! ```

use std::collections::HashMap;

use mysql_types::{SqlValue, ToSql, TypeError};

use crate::error::{Error, Result};

/// One placeholder slot of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// The n-th `?` placeholder (0-based among `?` only).
    Positional(usize),
    /// A `:name` placeholder.
    Named(String),
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positional(i) => write!(f, "?{}", i + 1),
            Self::Named(name) => write!(f, ":{name}"),
        }
    }
}

/// SQL with its placeholders located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    sql: String,
    slots: Vec<Slot>,
    positional: usize,
}

impl ParsedSql {
    /// Scan `sql` for placeholders.
    #[must_use]
    pub fn parse(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut out = String::with_capacity(sql.len());
        let mut slots = Vec::new();
        let mut positional = 0;
        // Start of the text not yet copied to `out`.
        let mut copied = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
                b'#' => i = skip_line(bytes, i),
                b'-' if bytes.get(i + 1) == Some(&b'-')
                    && bytes.get(i + 2).is_none_or(|b| b.is_ascii_whitespace()) =>
                {
                    i = skip_line(bytes, i);
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
                b'?' => {
                    slots.push(Slot::Positional(positional));
                    positional += 1;
                    i += 1;
                }
                b':' if i > 0 && bytes[i - 1] == b':' => i += 1,
                b':' if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b)) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len() && is_ident_char(bytes[end]) {
                        end += 1;
                    }
                    out.push_str(&sql[copied..i]);
                    out.push('?');
                    copied = end;
                    slots.push(Slot::Named(sql[start..end].to_string()));
                    i = end;
                }
                _ => i += 1,
            }
        }
        out.push_str(&sql[copied..]);

        Self {
            sql: out,
            slots,
            positional,
        }
    }

    /// SQL to send to the server, with `:name` replaced by `?`.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// All placeholder slots in order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Total number of placeholders.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of `?` placeholders.
    #[must_use]
    pub fn positional_count(&self) -> usize {
        self.positional
    }

    /// Whether any `:name` placeholder is present.
    #[must_use]
    pub fn has_named(&self) -> bool {
        self.positional != self.slots.len()
    }

    /// Name to slot indexes. A name may appear more than once.
    #[must_use]
    pub fn named_positions(&self) -> HashMap<&str, Vec<usize>> {
        let mut map: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if let Slot::Named(name) = slot {
                map.entry(name.as_str()).or_default().push(index);
            }
        }
        map
    }

    /// Resolve `params` into one value per slot.
    ///
    /// A slot flagged in `prebound` was filled with long data and yields
    /// `None`; positional values skip such slots. Every check runs before
    /// any I/O.
    pub fn bind(&self, params: Params, prebound: &[bool]) -> Result<Vec<Option<SqlValue>>> {
        let is_prebound = |index: usize| prebound.get(index).copied().unwrap_or(false);

        let open_positional = self
            .slots
            .iter()
            .enumerate()
            .filter(|(i, slot)| matches!(slot, Slot::Positional(_)) && !is_prebound(*i))
            .count();
        if params.positional.len() > open_positional {
            return Err(Error::TooManyParameters {
                expected: open_positional,
                actual: params.positional.len(),
            });
        }
        let names = self.named_positions();
        if let Some(unknown) = params.named.keys().find(|name| !names.contains_key(name.as_str())) {
            return Err(Error::UnknownParameter(unknown.clone()));
        }

        let mut positional = params.positional.into_iter();
        let mut values = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            let value = match slot {
                _ if is_prebound(index) => {
                    values.push(None);
                    continue;
                }
                Slot::Positional(_) => positional.next(),
                Slot::Named(name) => params.named.get(name).cloned(),
            };
            match value {
                Some(value) => values.push(Some(value)),
                None => return Err(Error::MissingParameter(slot.to_string())),
            }
        }
        Ok(values)
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Index just past the closing quote. Handles doubled quotes and, outside
/// backticks, backslash escapes.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote != b'`' => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

/// Values for a statement's placeholders.
///
/// ```rust,ignore
/// let params = Params::new().push(5).bind("name", "x");
/// conn.prepare("SELECT * FROM t WHERE a = ? AND b = :name").await?
///     .execute(params).await?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    positional: Vec<SqlValue>,
    named: HashMap<String, SqlValue>,
}

impl Params {
    /// Empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional value.
    #[must_use]
    pub fn push(mut self, value: impl Into<SqlValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named value.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let name = name.into();
        let name = name.strip_prefix(':').map(str::to_owned).unwrap_or(name);
        self.named.insert(name, value.into());
        self
    }

    /// Positional values from `ToSql` references.
    pub fn from_sql(values: &[&(dyn ToSql + Sync)]) -> std::result::Result<Self, TypeError> {
        let positional = values
            .iter()
            .map(|v| v.to_sql())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            positional,
            named: HashMap::new(),
        })
    }

    /// Number of positional values.
    #[must_use]
    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    /// Whether no values are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Self::default()
    }
}

impl From<Vec<SqlValue>> for Params {
    fn from(positional: Vec<SqlValue>) -> Self {
        Self {
            positional,
            named: HashMap::new(),
        }
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::default(), |params, (k, v)| params.bind(k, v))
    }
}
