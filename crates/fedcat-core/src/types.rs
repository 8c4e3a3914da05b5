//! Canonical type system shared by every connector.
//!
//! Connector type converters translate their native type strings into
//! [`CanonicalType`] and back. The canonical textual form is what
//! [`crate::model::FieldInfo::type_name`] carries.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A type in the canonical type system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Char(u32),
    Varchar(Option<u32>),
    String,
    Binary,
    Fixed(u32),
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Array(Box<CanonicalType>),
    Map(Box<CanonicalType>, Box<CanonicalType>),
    Row(Vec<RowField>),
    /// A native type with no canonical counterpart, kept verbatim.
    Unknown(std::string::String),
}

/// A named field inside a [`CanonicalType::Row`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowField {
    pub name: std::string::String,
    pub field_type: CanonicalType,
}

impl RowField {
    pub fn new(name: impl Into<std::string::String>, field_type: CanonicalType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

impl CanonicalType {
    /// Whether this type nests other types.
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            CanonicalType::Array(_) | CanonicalType::Map(_, _) | CanonicalType::Row(_)
        )
    }

    /// Parse the canonical textual form produced by `Display`.
    ///
    /// Unrecognised input becomes [`CanonicalType::Unknown`] rather than an
    /// error so that metadata round trips never lose a column.
    pub fn parse(input: &str) -> CanonicalType {
        let s = input.trim();
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "boolean" => return CanonicalType::Boolean,
            "tinyint" => return CanonicalType::TinyInt,
            "smallint" => return CanonicalType::SmallInt,
            "int" => return CanonicalType::Int,
            "bigint" => return CanonicalType::BigInt,
            "float" => return CanonicalType::Float,
            "double" => return CanonicalType::Double,
            "varchar" => return CanonicalType::Varchar(None),
            "string" => return CanonicalType::String,
            "binary" => return CanonicalType::Binary,
            "date" => return CanonicalType::Date,
            "time" => return CanonicalType::Time,
            "timestamp" => return CanonicalType::Timestamp,
            "timestamp with time zone" => return CanonicalType::TimestampTz,
            "uuid" => return CanonicalType::Uuid,
            _ => {}
        }

        if let Some(args) = type_args(s, "decimal") {
            let parts = split_top_level(args);
            if let [p, sc] = parts.as_slice() {
                if let (Ok(precision), Ok(scale)) = (p.trim().parse(), sc.trim().parse()) {
                    return CanonicalType::Decimal { precision, scale };
                }
            }
        } else if let Some(args) = type_args(s, "char") {
            if let Ok(n) = args.trim().parse() {
                return CanonicalType::Char(n);
            }
        } else if let Some(args) = type_args(s, "varchar") {
            if let Ok(n) = args.trim().parse() {
                return CanonicalType::Varchar(Some(n));
            }
        } else if let Some(args) = type_args(s, "fixed") {
            if let Ok(n) = args.trim().parse() {
                return CanonicalType::Fixed(n);
            }
        } else if let Some(args) = type_args(s, "array") {
            return CanonicalType::Array(Box::new(CanonicalType::parse(args)));
        } else if let Some(args) = type_args(s, "map") {
            if let [k, v] = split_top_level(args).as_slice() {
                return CanonicalType::Map(
                    Box::new(CanonicalType::parse(k)),
                    Box::new(CanonicalType::parse(v)),
                );
            }
        } else if let Some(args) = type_args(s, "row") {
            let mut fields = Vec::new();
            for part in split_top_level(args) {
                let part = part.trim();
                match part.split_once(' ') {
                    Some((name, ty)) => fields.push(RowField::new(name, CanonicalType::parse(ty))),
                    None => return CanonicalType::Unknown(s.to_string()),
                }
            }
            return CanonicalType::Row(fields);
        }

        CanonicalType::Unknown(s.to_string())
    }
}

/// Returns the text between `name(` and the matching final `)`.
pub(crate) fn type_args<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    type_args_with(s, name, '(', ')')
}

/// Like [`type_args`] with caller-chosen brackets (`<>` for Hive, `[]` for Iceberg fixed).
pub(crate) fn type_args_with<'a>(s: &'a str, name: &str, open: char, close: char) -> Option<&'a str> {
    let head = s.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let rest = s[name.len()..].trim_start();
    let inner = rest.strip_prefix(open)?.strip_suffix(close)?;
    Some(inner)
}

/// Split on commas that are not nested inside `()` `<>` or `[]`.
pub(crate) fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '<' | '[' => depth += 1,
            ')' | '>' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < s.len() || !parts.is_empty() {
        parts.push(&s[start..]);
    }
    parts
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalType::Boolean => f.write_str("boolean"),
            CanonicalType::TinyInt => f.write_str("tinyint"),
            CanonicalType::SmallInt => f.write_str("smallint"),
            CanonicalType::Int => f.write_str("int"),
            CanonicalType::BigInt => f.write_str("bigint"),
            CanonicalType::Float => f.write_str("float"),
            CanonicalType::Double => f.write_str("double"),
            CanonicalType::Decimal { precision, scale } => {
                write!(f, "decimal({},{})", precision, scale)
            }
            CanonicalType::Char(n) => write!(f, "char({})", n),
            CanonicalType::Varchar(Some(n)) => write!(f, "varchar({})", n),
            CanonicalType::Varchar(None) => f.write_str("varchar"),
            CanonicalType::String => f.write_str("string"),
            CanonicalType::Binary => f.write_str("binary"),
            CanonicalType::Fixed(n) => write!(f, "fixed({})", n),
            CanonicalType::Date => f.write_str("date"),
            CanonicalType::Time => f.write_str("time"),
            CanonicalType::Timestamp => f.write_str("timestamp"),
            CanonicalType::TimestampTz => f.write_str("timestamp with time zone"),
            CanonicalType::Uuid => f.write_str("uuid"),
            CanonicalType::Array(element) => write!(f, "array({})", element),
            CanonicalType::Map(key, value) => write!(f, "map({},{})", key, value),
            CanonicalType::Row(fields) => {
                f.write_str("row(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{} {}", field.name, field.field_type)?;
                }
                f.write_str(")")
            }
            CanonicalType::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for CanonicalType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CanonicalType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = std::string::String::deserialize(deserializer)?;
        Ok(CanonicalType::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_display_parse() {
        for ty in [
            CanonicalType::Boolean,
            CanonicalType::BigInt,
            CanonicalType::TimestampTz,
            CanonicalType::Varchar(None),
            CanonicalType::Uuid,
        ] {
            assert_eq!(CanonicalType::parse(&ty.to_string()), ty);
        }
    }

    #[test]
    fn test_parameterized_types() {
        assert_eq!(
            CanonicalType::parse("decimal(10, 2)"),
            CanonicalType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(CanonicalType::parse("char(8)"), CanonicalType::Char(8));
        assert_eq!(
            CanonicalType::parse("varchar(255)"),
            CanonicalType::Varchar(Some(255))
        );
    }

    #[test]
    fn test_nested_types() {
        let ty = CanonicalType::parse("map(string,array(row(id bigint,tags array(string))))");
        let expected = CanonicalType::Map(
            Box::new(CanonicalType::String),
            Box::new(CanonicalType::Array(Box::new(CanonicalType::Row(vec![
                RowField::new("id", CanonicalType::BigInt),
                RowField::new(
                    "tags",
                    CanonicalType::Array(Box::new(CanonicalType::String)),
                ),
            ])))),
        );
        assert_eq!(ty, expected);
        assert!(ty.is_nested());
        assert_eq!(
            ty.to_string(),
            "map(string,array(row(id bigint,tags array(string))))"
        );
    }

    #[test]
    fn test_unknown_kept_verbatim() {
        let ty = CanonicalType::parse("geometry");
        assert_eq!(ty, CanonicalType::Unknown("geometry".into()));
        assert_eq!(ty.to_string(), "geometry");
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a,b<c,d>,e"), vec!["a", "b<c,d>", "e"]);
        assert!(split_top_level("").is_empty());
    }
}
