// crates/db-agent-core/src/core/templates.rs
// ============================================================================
// Module: Query Template Registry
// Description: Registered, parameterized SQL statements with typed params.
// Purpose: Constrain the query path to validated, dialect-dispatched SQL.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Templates are the only SQL the capability-gated query path can execute.
//! Each template declares its mode, a typed parameter schema, and
//! dialect-indexed SQL text with positional placeholders. Validation
//! normalizes values (addresses to lowercase, ISO dates to UTC) and binds
//! them in declaration order.
//!
//! Security posture: parameter values are untrusted; templates never
//! interpolate values into SQL text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::core::adapter::Dialect;
use crate::core::adapter::ExecuteMode;
use crate::core::decision::codes;
use crate::core::identifiers::WalletAddress;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Parameter Schema
// ============================================================================

/// Typed parameter kind with its validation bounds.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Integer bounded to `min..=max`.
    Integer {
        /// Minimum accepted value.
        min: i64,
        /// Maximum accepted value.
        max: i64,
    },
    /// UTF-8 string bounded to `min_len..=max_len` characters.
    Text {
        /// Minimum accepted character count.
        min_len: usize,
        /// Maximum accepted character count.
        max_len: usize,
    },
    /// EVM address, normalized to lowercase.
    Address,
    /// One of a fixed value set.
    Enum {
        /// Accepted values.
        values: Vec<String>,
    },
    /// ISO-8601 date-time, normalized to UTC RFC 3339.
    IsoDate,
}

/// Single template parameter declaration.
///
/// # Invariants
/// - `default`, when present, must already satisfy the kind's bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Wire name of the parameter.
    pub name: String,
    /// Whether the parameter must be supplied when no default exists.
    pub required: bool,
    /// Default value applied when the parameter is absent.
    pub default: Option<Value>,
    /// Parameter kind and bounds.
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Declares a required parameter of the given kind.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
            kind,
        }
    }

    /// Declares an optional parameter with a default value.
    #[must_use]
    pub fn with_default(name: impl Into<String>, kind: ParamKind, default: Value) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: Some(default),
            kind,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Parameter validation failures.
///
/// # Invariants
/// - Messages name the offending parameter but never echo its value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    /// Required parameter absent with no default.
    #[error("missing required parameter: {name}")]
    MissingParam {
        /// Parameter name.
        name: String,
    },
    /// Parameter present with the wrong JSON type.
    #[error("parameter {name} must be {expected}")]
    InvalidType {
        /// Parameter name.
        name: String,
        /// Expected type label.
        expected: &'static str,
    },
    /// Integer parameter outside its bounds.
    #[error("parameter {name} out of range ({min}..={max})")]
    OutOfRange {
        /// Parameter name.
        name: String,
        /// Minimum accepted value.
        min: i64,
        /// Maximum accepted value.
        max: i64,
    },
    /// String parameter outside its length bounds.
    #[error("parameter {name} length out of range ({min_len}..={max_len})")]
    BadLength {
        /// Parameter name.
        name: String,
        /// Minimum accepted character count.
        min_len: usize,
        /// Maximum accepted character count.
        max_len: usize,
    },
    /// Address or ISO-date parameter failed format parsing.
    #[error("parameter {name} has an invalid {format} format")]
    BadFormat {
        /// Parameter name.
        name: String,
        /// Format label (`address` or `iso-date`).
        format: &'static str,
    },
    /// Enum parameter outside the allowed value set.
    #[error("parameter {name} must be one of the allowed values")]
    BadValue {
        /// Parameter name.
        name: String,
        /// Accepted values.
        allowed: Vec<String>,
    },
    /// Parameter name not declared by the template.
    #[error("unknown parameter: {name}")]
    UnknownParam {
        /// Parameter name.
        name: String,
        /// Declared parameter names.
        allowed: Vec<String>,
    },
}

impl TemplateError {
    /// Returns the stable decision code for this failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingParam {
                ..
            } => codes::MISSING_PARAM,
            Self::InvalidType {
                ..
            } => codes::INVALID_PARAM_TYPE,
            Self::OutOfRange {
                ..
            } => codes::INVALID_PARAM_RANGE,
            Self::BadLength {
                ..
            } => codes::INVALID_PARAM_LENGTH,
            Self::BadFormat {
                ..
            } => codes::INVALID_PARAM_FORMAT,
            Self::BadValue {
                ..
            } => codes::INVALID_PARAM_VALUE,
            Self::UnknownParam {
                ..
            } => codes::UNKNOWN_PARAM,
        }
    }
}

// ============================================================================
// SECTION: Query Template
// ============================================================================

/// Immutable registered query template.
///
/// # Invariants
/// - `sql` placeholders are positional and follow parameter declaration
///   order (`?N` for sqlite, `$N` for postgres).
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    /// Template name used by callers.
    pub name: String,
    /// Read or write mode.
    pub mode: ExecuteMode,
    /// Typed parameter declarations in bind order.
    pub params: Vec<ParamSpec>,
    /// Dialect-indexed SQL text.
    pub sql: BTreeMap<Dialect, String>,
}

impl QueryTemplate {
    /// Returns the SQL text for the given dialect when registered.
    #[must_use]
    pub fn sql_for(&self, dialect: Dialect) -> Option<&str> {
        self.sql.get(&dialect).map(String::as_str)
    }

    /// Returns the declared parameter names.
    #[must_use]
    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|param| param.name.clone()).collect()
    }

    /// Validates and normalizes caller parameters into positional bind
    /// values in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] on the first violated constraint; unknown
    /// extra parameters are rejected after the declared schema passes.
    pub fn bind(&self, supplied: &serde_json::Map<String, Value>) -> Result<Vec<Value>, TemplateError> {
        let mut values = Vec::with_capacity(self.params.len());
        for spec in &self.params {
            let raw = match supplied.get(&spec.name) {
                Some(value) => value.clone(),
                None => match &spec.default {
                    Some(default) => default.clone(),
                    None if spec.required => {
                        return Err(TemplateError::MissingParam {
                            name: spec.name.clone(),
                        });
                    }
                    None => Value::Null,
                },
            };
            values.push(validate_value(spec, raw)?);
        }
        for name in supplied.keys() {
            if !self.params.iter().any(|spec| &spec.name == name) {
                return Err(TemplateError::UnknownParam {
                    name: name.clone(),
                    allowed: self.param_names(),
                });
            }
        }
        Ok(values)
    }
}

/// Validates a single parameter value against its declaration.
fn validate_value(spec: &ParamSpec, raw: Value) -> Result<Value, TemplateError> {
    match &spec.kind {
        ParamKind::Integer {
            min,
            max,
        } => {
            let Some(value) = raw.as_i64() else {
                return Err(TemplateError::InvalidType {
                    name: spec.name.clone(),
                    expected: "an integer",
                });
            };
            if value < *min || value > *max {
                return Err(TemplateError::OutOfRange {
                    name: spec.name.clone(),
                    min: *min,
                    max: *max,
                });
            }
            Ok(Value::from(value))
        }
        ParamKind::Text {
            min_len,
            max_len,
        } => {
            let Some(value) = raw.as_str() else {
                return Err(TemplateError::InvalidType {
                    name: spec.name.clone(),
                    expected: "a string",
                });
            };
            let length = value.chars().count();
            if length < *min_len || length > *max_len {
                return Err(TemplateError::BadLength {
                    name: spec.name.clone(),
                    min_len: *min_len,
                    max_len: *max_len,
                });
            }
            Ok(Value::from(value.to_string()))
        }
        ParamKind::Address => {
            let Some(value) = raw.as_str() else {
                return Err(TemplateError::InvalidType {
                    name: spec.name.clone(),
                    expected: "an address string",
                });
            };
            let address = WalletAddress::parse(value).map_err(|_| TemplateError::BadFormat {
                name: spec.name.clone(),
                format: "address",
            })?;
            Ok(Value::from(address.as_str().to_string()))
        }
        ParamKind::Enum {
            values,
        } => {
            let Some(value) = raw.as_str() else {
                return Err(TemplateError::InvalidType {
                    name: spec.name.clone(),
                    expected: "a string",
                });
            };
            if !values.iter().any(|allowed| allowed == value) {
                return Err(TemplateError::BadValue {
                    name: spec.name.clone(),
                    allowed: values.clone(),
                });
            }
            Ok(Value::from(value.to_string()))
        }
        ParamKind::IsoDate => {
            let Some(value) = raw.as_str() else {
                return Err(TemplateError::InvalidType {
                    name: spec.name.clone(),
                    expected: "an ISO-8601 string",
                });
            };
            let parsed = Timestamp::parse(value).map_err(|_| TemplateError::BadFormat {
                name: spec.name.clone(),
                format: "iso-date",
            })?;
            let formatted = parsed.format().map_err(|_| TemplateError::BadFormat {
                name: spec.name.clone(),
                format: "iso-date",
            })?;
            Ok(Value::from(formatted))
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Ordered template registry.
///
/// # Invariants
/// - Template names are unique; registration order is preserved.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    /// Registered templates in registration order.
    templates: Vec<QueryTemplate>,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            templates: Vec::new(),
        }
    }

    /// Registers a template, replacing any previous entry with the same name.
    pub fn register(&mut self, template: QueryTemplate) {
        if let Some(index) =
            self.templates.iter().position(|entry| entry.name == template.name)
        {
            self.templates[index] = template;
        } else {
            self.templates.push(template);
        }
    }

    /// Returns the template with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&QueryTemplate> {
        self.templates.iter().find(|template| template.name == name)
    }

    /// Returns registered template names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.templates.iter().map(|template| template.name.clone()).collect()
    }

    /// Builds the canonical seed registry shipped with the agent.
    #[must_use]
    pub fn canonical_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(QueryTemplate {
            name: "wallet_balances".to_string(),
            mode: ExecuteMode::Read,
            params: vec![
                ParamSpec::required("walletAddress", ParamKind::Address),
                ParamSpec::with_default(
                    "chainId",
                    ParamKind::Integer {
                        min: 1,
                        max: 1_000_000_000,
                    },
                    Value::from(1),
                ),
                ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer {
                        min: 1,
                        max: 500,
                    },
                    Value::from(25),
                ),
            ],
            sql: BTreeMap::from([
                (
                    Dialect::Sqlite,
                    "SELECT wallet_address, chain_id, asset_symbol, balance, updated_at FROM \
                     wallet_balances WHERE wallet_address = ?1 AND chain_id = ?2 ORDER BY \
                     asset_symbol LIMIT ?3"
                        .to_string(),
                ),
                (
                    Dialect::Postgres,
                    "SELECT wallet_address, chain_id, asset_symbol, balance, updated_at FROM \
                     wallet_balances WHERE wallet_address = $1 AND chain_id = $2 ORDER BY \
                     asset_symbol LIMIT $3"
                        .to_string(),
                ),
            ]),
        });
        registry.register(QueryTemplate {
            name: "wallet_positions".to_string(),
            mode: ExecuteMode::Read,
            params: vec![
                ParamSpec::required("walletAddress", ParamKind::Address),
                ParamSpec::with_default(
                    "chainId",
                    ParamKind::Integer {
                        min: 1,
                        max: 1_000_000_000,
                    },
                    Value::from(1),
                ),
                ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer {
                        min: 1,
                        max: 500,
                    },
                    Value::from(25),
                ),
            ],
            sql: BTreeMap::from([
                (
                    Dialect::Sqlite,
                    "SELECT wallet_address, chain_id, protocol, position_kind, amount, \
                     updated_at FROM wallet_positions WHERE wallet_address = ?1 AND chain_id = \
                     ?2 ORDER BY protocol LIMIT ?3"
                        .to_string(),
                ),
                (
                    Dialect::Postgres,
                    "SELECT wallet_address, chain_id, protocol, position_kind, amount, \
                     updated_at FROM wallet_positions WHERE wallet_address = $1 AND chain_id = \
                     $2 ORDER BY protocol LIMIT $3"
                        .to_string(),
                ),
            ]),
        });
        registry.register(QueryTemplate {
            name: "wallet_transactions".to_string(),
            mode: ExecuteMode::Read,
            params: vec![
                ParamSpec::required("walletAddress", ParamKind::Address),
                ParamSpec::with_default(
                    "chainId",
                    ParamKind::Integer {
                        min: 1,
                        max: 1_000_000_000,
                    },
                    Value::from(1),
                ),
                ParamSpec::with_default(
                    "since",
                    ParamKind::IsoDate,
                    Value::from("1970-01-01T00:00:00Z"),
                ),
                ParamSpec::with_default(
                    "limit",
                    ParamKind::Integer {
                        min: 1,
                        max: 500,
                    },
                    Value::from(25),
                ),
            ],
            sql: BTreeMap::from([
                (
                    Dialect::Sqlite,
                    "SELECT tx_hash, wallet_address, chain_id, direction, amount, asset_symbol, \
                     created_at FROM wallet_transactions WHERE wallet_address = ?1 AND chain_id \
                     = ?2 AND created_at >= ?3 ORDER BY created_at DESC LIMIT ?4"
                        .to_string(),
                ),
                (
                    Dialect::Postgres,
                    "SELECT tx_hash, wallet_address, chain_id, direction, amount, asset_symbol, \
                     created_at FROM wallet_transactions WHERE wallet_address = $1 AND chain_id \
                     = $2 AND created_at >= $3 ORDER BY created_at DESC LIMIT $4"
                        .to_string(),
                ),
            ]),
        });
        registry.register(QueryTemplate {
            name: "access_log_insert".to_string(),
            mode: ExecuteMode::Write,
            params: vec![
                ParamSpec::required("walletAddress", ParamKind::Address),
                ParamSpec::required(
                    "action",
                    ParamKind::Text {
                        min_len: 1,
                        max_len: 128,
                    },
                ),
                ParamSpec::required(
                    "resource",
                    ParamKind::Text {
                        min_len: 1,
                        max_len: 256,
                    },
                ),
                ParamSpec::with_default(
                    "status",
                    ParamKind::Enum {
                        values: vec!["success".to_string(), "failure".to_string()],
                    },
                    Value::from("success"),
                ),
            ],
            sql: BTreeMap::from([
                (
                    Dialect::Sqlite,
                    "INSERT INTO access_log (wallet_address, action, resource, status, \
                     created_at) VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)"
                        .to_string(),
                ),
                (
                    Dialect::Postgres,
                    "INSERT INTO access_log (wallet_address, action, resource, status, \
                     created_at) VALUES ($1, $2, $3, $4, NOW())"
                        .to_string(),
                ),
            ]),
        });
        registry
    }
}
