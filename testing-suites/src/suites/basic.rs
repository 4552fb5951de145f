//! basic - harness sanity checks that need no chain interaction

use spectre_testing_framework::prelude::*;

/// Suite declaration
pub fn suite() -> SuiteDeclaration {
    SuiteDeclaration::builder("basic", "basic", FoundationKind::Dev)
        .before_all(|ctx| async move {
            log::info!("running this before tests of '{}'", ctx.suite_id());
            Ok(())
        })
        .case("should run: true is true", |_ctx| async move {
            ensure!(true);
            Ok(())
        })
        .case("should run: 3 > 2", |_ctx| async move {
            let (a, b) = (3, 2);
            ensure!(a > b);
            Ok(())
        })
        .case("should run: non-empty string", |_ctx| async move {
            ensure!(!"true".is_empty());
            Ok(())
        })
        .build()
}
