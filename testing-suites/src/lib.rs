//! # Spectre Test Suites
//!
//! The node's suites, declared as values and registered explicitly by
//! [`register_all`] in execution order.

#![warn(missing_docs)]

/// Suite modules, one per declaration
pub mod suites {
    /// `basic`
    pub mod basic;
    /// `END TO END MVP`
    pub mod end_to_end;
    /// `DF0101`
    pub mod existential_deposit;
    /// `T1`
    pub mod integration;
}

use spectre_testing_framework::{HarnessError, SuiteDeclaration, SuiteRegistry};

/// Every suite, in execution order.
pub fn all_suites() -> Vec<SuiteDeclaration> {
    vec![
        suites::basic::suite(),
        suites::integration::suite(),
        suites::existential_deposit::suite(),
        suites::end_to_end::suite(),
    ]
}

/// Register every suite into `registry`.
pub fn register_all(registry: &mut SuiteRegistry) -> Result<(), HarnessError> {
    for suite in all_suites() {
        registry.register(suite)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let mut registry = SuiteRegistry::new();
        register_all(&mut registry).unwrap();

        let ids: Vec<_> = registry.all().iter().map(|s| s.id()).collect();
        assert_eq!(ids, ["basic", "T1", "DF0101", "END TO END MVP"]);
        assert!(register_all(&mut registry).is_err());
        assert_eq!(registry.len(), 4);
    }
}
