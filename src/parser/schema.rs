//! Field schema declared by a `#Fields` directive line
//!
//! `#Fields: date time x-edge-location sc-bytes cs(User-Agent)` becomes
//! `humantstamp timestamp x-edge-location sc-bytes cs_User-Agent`.

/// Prefix of every directive line
pub const DIRECTIVE_MARKER: char = '#';

/// First token of the schema directive (a trailing `:` is tolerated)
pub const FIELDS_DIRECTIVE: &str = "#Fields";

pub const HUMAN_TIMESTAMP_FIELD: &str = "humantstamp";
pub const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<String>,
}

impl FieldSchema {
    /// Derive a schema from a directive line, or `None` if it is some other directive
    pub fn from_directive(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let head = tokens.next()?;
        if head.strip_suffix(':').unwrap_or(head) != FIELDS_DIRECTIVE {
            return None;
        }

        let fields = tokens
            .enumerate()
            .map(|(i, name)| match i {
                0 => HUMAN_TIMESTAMP_FIELD.to_string(),
                1 => TIMESTAMP_FIELD.to_string(),
                _ => normalize_field_name(name),
            })
            .collect();

        Some(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field == name)
    }
}

/// `cs(User-Agent)` -> `cs_User-Agent`
pub fn normalize_field_name(name: &str) -> String {
    name.replace('(', "_").replace(')', "")
}
