//! Tenant identity and tenant-scoped storage names
//!
//! A tenant is a named partition of one shared graph + vector store. Partitioning
//! is realised purely through naming: graph labels and vector index names get a
//! tenant suffix, node ids never do. The default tenant (no name) maps to the
//! unscoped names so single-tenant deployments keep working unchanged.
//!
//! Tenant names are 1-25 characters from `[a-z0-9.]` and may not start or end
//! with a period. Since `_` is not allowed in a tenant name, the `__` and `_`
//! separators used below can never be produced by two different
//! `(type, tenant)` pairs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a custom tenant name
pub const MAX_TENANT_ID_LEN: usize = 25;

/// Sentinel string that explicitly selects the default tenant
pub const DEFAULT_TENANT_SENTINEL: &str = "default_";

/// Error returned when a tenant name fails validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid TenantId: '{value}' ({reason})")]
pub struct TenantIdError {
    /// The rejected value
    pub value: String,
    /// Why it was rejected
    pub reason: &'static str,
}

/// Identifies the tenant a graph or vector operation targets
///
/// `TenantId::default()` is the default tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "Option<String>")]
pub struct TenantId {
    value: Option<String>,
}

impl TenantId {
    /// Parse and validate a tenant name
    ///
    /// The sentinel `default_` (any case) yields the default tenant.
    pub fn new(value: impl Into<String>) -> Result<Self, TenantIdError> {
        let value = value.into();
        if value.eq_ignore_ascii_case(DEFAULT_TENANT_SENTINEL) {
            return Ok(Self::default());
        }
        validate_tenant_id(&value)?;
        Ok(Self { value: Some(value) })
    }

    /// The default tenant
    pub fn default_tenant() -> Self {
        Self::default()
    }

    /// Build from an optional name, treating `None` as the default tenant
    pub fn from_option(value: Option<&str>) -> Result<Self, TenantIdError> {
        match value {
            Some(v) => Self::new(v),
            None => Ok(Self::default()),
        }
    }

    /// The tenant name, `None` for the default tenant
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_default(&self) -> bool {
        self.value.is_none()
    }

    /// Graph label for a node type: `__Type__` or `__Type__<tenant>__`
    pub fn format_label(&self, node_type: &str) -> String {
        match &self.value {
            None => format!("__{node_type}__"),
            Some(tenant) => format!("__{node_type}__{tenant}__"),
        }
    }

    /// Vector index name: `index` or `index_<tenant>`
    pub fn format_index_name(&self, index_name: &str) -> String {
        match &self.value {
            None => index_name.to_string(),
            Some(tenant) => format!("{index_name}_{tenant}"),
        }
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            None => f.write_str("default"),
            Some(v) => f.write_str(v),
        }
    }
}

impl FromStr for TenantId {
    type Err = TenantIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<Option<String>> for TenantId {
    type Error = TenantIdError;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        match value {
            Some(v) => Self::new(v),
            None => Ok(Self::default()),
        }
    }
}

impl From<TenantId> for Option<String> {
    fn from(tenant: TenantId) -> Self {
        tenant.value
    }
}

/// Validate a custom tenant name without constructing a [`TenantId`]
pub fn validate_tenant_id(value: &str) -> Result<(), TenantIdError> {
    let reject = |reason| {
        Err(TenantIdError {
            value: value.to_string(),
            reason,
        })
    };

    if value.is_empty() {
        return reject("must not be empty");
    }
    if value.chars().count() > MAX_TENANT_ID_LEN {
        return reject("must be at most 25 characters");
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.')
    {
        return reject("only lowercase letters, digits and '.' are allowed");
    }
    if value.starts_with('.') || value.ends_with('.') {
        return reject("must not start or end with '.'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tenant_ids() {
        let longest = "a".repeat(25);
        for value in ["user123", "a.b.c", "acme", "x", longest.as_str()] {
            let tenant = TenantId::new(value).unwrap();
            assert_eq!(tenant.value(), Some(value));
            assert!(!tenant.is_default());
        }
    }

    #[test]
    fn test_invalid_tenant_ids() {
        let too_long = "a".repeat(26);
        for value in ["", too_long.as_str(), ".abc", "abc.", "ABC", "a_b", "has space", "special!"] {
            let err = TenantId::new(value).unwrap_err();
            assert_eq!(err.value, value);
            assert!(err.to_string().starts_with("Invalid TenantId"));
        }
    }

    #[test]
    fn test_default_sentinel() {
        assert!(TenantId::new("default_").unwrap().is_default());
        assert!(TenantId::new("DEFAULT_").unwrap().is_default());
        assert!(TenantId::from_option(None).unwrap().is_default());
    }

    #[test]
    fn test_format_label() {
        let default = TenantId::default();
        let acme = TenantId::new("acme").unwrap();

        assert_eq!(default.format_label("Chunk"), "__Chunk__");
        assert_eq!(acme.format_label("Chunk"), "__Chunk__acme__");
    }

    #[test]
    fn test_format_index_name() {
        let default = TenantId::default();
        let acme = TenantId::new("acme").unwrap();

        assert_eq!(default.format_index_name("statement"), "statement");
        assert_eq!(acme.format_index_name("statement"), "statement_acme");
    }

    #[test]
    fn test_names_are_injective() {
        let tenants = [
            TenantId::default(),
            TenantId::new("a").unwrap(),
            TenantId::new("a.b").unwrap(),
            TenantId::new("ab").unwrap(),
        ];
        let types = ["Chunk", "Statement", "Source"];

        let mut labels = std::collections::HashSet::new();
        let mut indexes = std::collections::HashSet::new();
        for tenant in &tenants {
            for node_type in types {
                assert!(labels.insert(tenant.format_label(node_type)));
                assert!(indexes.insert(tenant.format_index_name(&node_type.to_lowercase())));
            }
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let acme = TenantId::new("acme").unwrap();
        let json = serde_json::to_string(&acme).unwrap();
        assert_eq!(json, "\"acme\"");
        assert_eq!(serde_json::from_str::<TenantId>(&json).unwrap(), acme);

        assert!(serde_json::from_str::<TenantId>("null").unwrap().is_default());
        assert!(serde_json::from_str::<TenantId>("\"Bad_Name\"").is_err());
    }
}
