//! Suite registry
//!
//! Registration order is execution order. The registry is append-only for a
//! run; ids are unique and the first registration of an id wins.

use super::SuiteDeclaration;
use crate::error::HarnessError;

/// Ordered collection of suites with unique ids.
#[derive(Debug, Default, Clone)]
pub struct SuiteRegistry {
    suites: Vec<SuiteDeclaration>,
}

impl SuiteRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `suite`.
    ///
    /// Fails with [`HarnessError::DuplicateSuiteId`] if the id is taken (the
    /// registry keeps the first declaration) and with
    /// [`HarnessError::InvalidSuite`] if the id is blank.
    pub fn register(&mut self, suite: SuiteDeclaration) -> Result<(), HarnessError> {
        if suite.id().trim().is_empty() {
            return Err(HarnessError::InvalidSuite(format!(
                "suite '{}' has an empty id",
                suite.title()
            )));
        }
        if self.get(suite.id()).is_some() {
            log::warn!("Rejected duplicate suite id '{}'", suite.id());
            return Err(HarnessError::DuplicateSuiteId(suite.id().to_string()));
        }
        log::debug!(
            "Registered suite '{}' ({}) on {} foundation",
            suite.id(),
            suite.title(),
            suite.foundation()
        );
        self.suites.push(suite);
        Ok(())
    }

    /// Suites in registration order
    pub fn all(&self) -> &[SuiteDeclaration] {
        &self.suites
    }

    /// Suite by id
    pub fn get(&self, id: &str) -> Option<&SuiteDeclaration> {
        self.suites.iter().find(|s| s.id() == id)
    }

    /// Number of registered suites
    pub fn len(&self) -> usize {
        self.suites.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Drop every registration. Only meant for process start.
    pub fn clear(&mut self) {
        self.suites.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::FoundationKind;
    use proptest::prelude::*;

    fn suite(id: &str, title: &str) -> SuiteDeclaration {
        SuiteDeclaration::builder(id, title, FoundationKind::Dev).build()
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let mut registry = SuiteRegistry::new();
        registry.register(suite("T1", "first")).unwrap();

        let err = registry.register(suite("T1", "second")).unwrap_err();
        assert_eq!(err, HarnessError::DuplicateSuiteId("T1".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("T1").unwrap().title(), "first");
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut registry = SuiteRegistry::new();
        let err = registry.register(suite("  ", "blank")).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidSuite(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut registry = SuiteRegistry::new();
        registry.register(suite("a", "a")).unwrap();
        registry.clear();
        assert!(registry.is_empty());
        registry.register(suite("a", "a again")).unwrap();
        assert_eq!(registry.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_registration_order_and_uniqueness(ids in prop::collection::vec("[a-d]{1,2}", 0..24)) {
            let mut registry = SuiteRegistry::new();
            let mut expected: Vec<String> = Vec::new();

            for (i, id) in ids.iter().enumerate() {
                let result = registry.register(suite(id, &format!("suite {}", i)));
                if expected.contains(id) {
                    prop_assert_eq!(result, Err(HarnessError::DuplicateSuiteId(id.clone())));
                } else {
                    prop_assert!(result.is_ok());
                    expected.push(id.clone());
                }
            }

            let actual: Vec<String> = registry.all().iter().map(|s| s.id().to_string()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
