// src/audit_types/registry.rs

use std::collections::BTreeMap;

use super::{AuditTypeDefinition, AuditTypeError, FiveSAudit, SecurityChecklistAudit};

/// Immutable map from audit type key to its definition.
///
/// Built once at startup and shared through the application state.
pub struct AuditTypeRegistry {
    definitions: BTreeMap<&'static str, Box<dyn AuditTypeDefinition>>,
}

impl AuditTypeRegistry {
    /// The audit types this service ships with.
    pub fn builtin() -> Self {
        let definitions: Vec<Box<dyn AuditTypeDefinition>> =
            vec![Box::new(FiveSAudit), Box::new(SecurityChecklistAudit)];
        Self::from_definitions(definitions)
    }

    pub fn from_definitions(definitions: Vec<Box<dyn AuditTypeDefinition>>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|definition| (definition.key(), definition))
            .collect();
        Self { definitions }
    }

    pub fn get(&self, key: &str) -> Option<&dyn AuditTypeDefinition> {
        self.definitions.get(key).map(|definition| definition.as_ref())
    }

    /// Like [`get`](Self::get) but turns a miss into an error callers can
    /// surface as a rejected request.
    pub fn resolve(&self, key: &str) -> Result<&dyn AuditTypeDefinition, AuditTypeError> {
        self.get(key)
            .ok_or_else(|| AuditTypeError::UnknownType(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn AuditTypeDefinition> {
        self.definitions.values().map(|definition| definition.as_ref())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for AuditTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for AuditTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.definitions.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_resolve_by_key() {
        let registry = AuditTypeRegistry::builtin();
        assert_eq!(registry.len(), 2);

        let five_s = registry.resolve("FIVE_S_AUDIT").unwrap();
        assert_eq!(five_s.name(), "5S Audit");

        let security = registry.resolve("SECURITY_CHECKLIST_AUDIT").unwrap();
        assert_eq!(security.name(), "Security Checklist Audit");
    }

    #[test]
    fn unknown_key_is_a_distinct_error() {
        let registry = AuditTypeRegistry::builtin();
        assert!(registry.get("BOGUS_TYPE").is_none());

        let err = registry.resolve("BOGUS_TYPE").err().unwrap();
        assert_eq!(err, AuditTypeError::UnknownType("BOGUS_TYPE".to_string()));
        assert_eq!(err.to_string(), "Invalid audit_type_definition_key 'BOGUS_TYPE'");
    }

    #[test]
    fn keys_are_case_sensitive() {
        let registry = AuditTypeRegistry::builtin();
        assert!(registry.get("five_s_audit").is_none());
    }

    #[test]
    fn listing_is_ordered_by_key() {
        let registry = AuditTypeRegistry::builtin();
        let keys: Vec<_> = registry.iter().map(|d| d.key()).collect();
        assert_eq!(keys, ["FIVE_S_AUDIT", "SECURITY_CHECKLIST_AUDIT"]);
    }
}
