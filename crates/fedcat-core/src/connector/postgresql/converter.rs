//! PostgreSQL type and column converters.

use crate::connector::ConnectorTypeConverter;
use crate::error::{CatalogError, CatalogResult};
use crate::model::FieldInfo;
use crate::types::{split_top_level, type_args, CanonicalType};

/// Converts PostgreSQL type names (`character varying(32)`, `int4[]`) to
/// canonical types. Both the SQL spelling and the internal `udt_name`
/// spelling are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypeConverter;

impl ConnectorTypeConverter for PostgresTypeConverter {
    fn to_canonical(&self, native: &str) -> CanonicalType {
        let s = native.trim();
        if let Some(element) = s.strip_suffix("[]") {
            return CanonicalType::Array(Box::new(self.to_canonical(element)));
        }
        match s.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => return CanonicalType::Boolean,
            "smallint" | "int2" | "smallserial" => return CanonicalType::SmallInt,
            "integer" | "int" | "int4" | "serial" => return CanonicalType::Int,
            "bigint" | "int8" | "bigserial" => return CanonicalType::BigInt,
            "real" | "float4" => return CanonicalType::Float,
            "double precision" | "float8" => return CanonicalType::Double,
            "text" | "json" | "jsonb" | "xml" | "name" => return CanonicalType::String,
            "character varying" | "varchar" => return CanonicalType::Varchar(None),
            "character" | "char" | "bpchar" => return CanonicalType::Char(1),
            "bytea" => return CanonicalType::Binary,
            "date" => return CanonicalType::Date,
            "time" | "time without time zone" => return CanonicalType::Time,
            "timestamp" | "timestamp without time zone" => return CanonicalType::Timestamp,
            "timestamptz" | "timestamp with time zone" => return CanonicalType::TimestampTz,
            "uuid" => return CanonicalType::Uuid,
            _ => {}
        }

        let numeric = type_args(s, "numeric").or_else(|| type_args(s, "decimal"));
        if let Some(args) = numeric {
            match split_top_level(args).as_slice() {
                [p, sc] => {
                    if let (Ok(precision), Ok(scale)) = (p.trim().parse(), sc.trim().parse()) {
                        return CanonicalType::Decimal { precision, scale };
                    }
                }
                [p] => {
                    if let Ok(precision) = p.trim().parse() {
                        return CanonicalType::Decimal { precision, scale: 0 };
                    }
                }
                _ => {}
            }
        } else if let Some(args) = type_args(s, "character varying").or_else(|| type_args(s, "varchar")) {
            if let Ok(n) = args.trim().parse() {
                return CanonicalType::Varchar(Some(n));
            }
        } else if let Some(args) = type_args(s, "character")
            .or_else(|| type_args(s, "char"))
            .or_else(|| type_args(s, "bpchar"))
        {
            if let Ok(n) = args.trim().parse() {
                return CanonicalType::Char(n);
            }
        }

        // Unconstrained numeric, enums, domains and extension types
        CanonicalType::Unknown(s.to_string())
    }

    fn from_canonical(&self, canonical: &CanonicalType) -> CatalogResult<String> {
        Ok(match canonical {
            CanonicalType::Boolean => "boolean".into(),
            CanonicalType::TinyInt | CanonicalType::SmallInt => "smallint".into(),
            CanonicalType::Int => "integer".into(),
            CanonicalType::BigInt => "bigint".into(),
            CanonicalType::Float => "real".into(),
            CanonicalType::Double => "double precision".into(),
            CanonicalType::Decimal { precision, scale } => format!("numeric({},{})", precision, scale),
            CanonicalType::Char(n) => format!("character({})", n),
            CanonicalType::Varchar(Some(n)) => format!("character varying({})", n),
            CanonicalType::Varchar(None) | CanonicalType::String => "text".into(),
            CanonicalType::Binary | CanonicalType::Fixed(_) => "bytea".into(),
            CanonicalType::Date => "date".into(),
            CanonicalType::Time => "time without time zone".into(),
            CanonicalType::Timestamp => "timestamp without time zone".into(),
            CanonicalType::TimestampTz => "timestamp with time zone".into(),
            CanonicalType::Uuid => "uuid".into(),
            CanonicalType::Array(element) => {
                if element.is_nested() {
                    return Err(CatalogError::constraint(
                        "PostgreSQL arrays cannot hold nested types",
                    ));
                }
                format!("{}[]", self.from_canonical(element)?)
            }
            CanonicalType::Map(_, _) | CanonicalType::Row(_) => {
                return Err(CatalogError::constraint(format!(
                    "PostgreSQL has no column type for {}",
                    canonical
                )));
            }
            CanonicalType::Unknown(raw) => raw.clone(),
        })
    }
}

/// One row of `information_schema.columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRow {
    pub column_name: String,
    pub data_type: String,
    pub udt_name: String,
    pub is_nullable: String,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub ordinal_position: i32,
    pub comment: Option<String>,
}

impl ColumnRow {
    /// The declared type as PostgreSQL would print it.
    ///
    /// `information_schema` splits modifiers into separate columns and
    /// reports every array as `ARRAY`, so the type is rebuilt from the parts.
    pub fn native_type(&self) -> String {
        match self.data_type.as_str() {
            "character varying" | "character" => match self.character_maximum_length {
                Some(n) => format!("{}({})", self.data_type, n),
                None => self.data_type.clone(),
            },
            "numeric" => match (self.numeric_precision, self.numeric_scale) {
                (Some(p), Some(s)) => format!("numeric({},{})", p, s),
                _ => "numeric".to_string(),
            },
            "ARRAY" => format!("{}[]", self.udt_name.trim_start_matches('_')),
            "USER-DEFINED" => self.udt_name.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_field(&self, converter: &dyn ConnectorTypeConverter) -> FieldInfo {
        let native = self.native_type();
        FieldInfo {
            name: self.column_name.clone(),
            type_name: converter.to_canonical(&native),
            source_type: Some(native),
            nullable: !self.is_nullable.eq_ignore_ascii_case("NO"),
            comment: self.comment.clone(),
            partition_key: false,
            pos: u32::try_from(self.ordinal_position.saturating_sub(1)).unwrap_or_default(),
        }
    }
}

/// Double-quote an identifier for interpolation into DDL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Schemas PostgreSQL manages for itself.
pub fn is_system_schema(schema: &str) -> bool {
    matches!(schema, "pg_catalog" | "information_schema" | "pg_toast")
        || schema.starts_with("pg_temp_")
        || schema.starts_with("pg_toast_temp_")
}
