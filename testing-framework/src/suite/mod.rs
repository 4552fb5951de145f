//! Suite declarations
//!
//! A suite is a plain value: id, title, foundation kind, optional
//! `before_all`/`before_each` hooks and a factory producing the ordered test
//! cases from the suite's [`Context`]. Declaring a suite has no side effects;
//! it only runs once registered and handed to the runner.
//!
//! ```rust,ignore
//! let suite = SuiteDeclaration::builder("A", "always passes", FoundationKind::Dev)
//!     .before_all(|ctx| async move {
//!         log::info!("suite {} starting", ctx.suite_id());
//!         Ok(())
//!     })
//!     .case("true is true", |_ctx| async move {
//!         anyhow::ensure!(true == true);
//!         Ok(())
//!     })
//!     .build();
//! ```

/// Ordered, duplicate-free suite collection
pub mod registry;

pub use registry::SuiteRegistry;

use crate::context::Context;
use crate::foundation::FoundationKind;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Hook or case body.
pub type SuiteFn = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Produces a suite's test cases from its context.
pub type CaseFactory = Arc<dyn Fn(&Context) -> Vec<TestCase> + Send + Sync>;

fn boxed<F, Fut>(f: F) -> SuiteFn
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// A named test case. Only its outcome survives the run.
#[derive(Clone)]
pub struct TestCase {
    name: String,
    body: SuiteFn,
}

impl TestCase {
    /// Case `name` running `body`.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: boxed(body),
        }
    }

    /// Case name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&self, ctx: Context) -> BoxFuture<'static, Result<()>> {
        (self.body)(ctx)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// Immutable description of a suite.
#[derive(Clone)]
pub struct SuiteDeclaration {
    id: String,
    title: String,
    foundation: FoundationKind,
    before_all: Option<SuiteFn>,
    before_each: Option<SuiteFn>,
    factory: CaseFactory,
}

impl SuiteDeclaration {
    /// Start declaring a suite.
    pub fn builder(
        id: impl Into<String>,
        title: impl Into<String>,
        foundation: FoundationKind,
    ) -> SuiteBuilder {
        SuiteBuilder {
            id: id.into(),
            title: title.into(),
            foundation,
            before_all: None,
            before_each: None,
            cases: Vec::new(),
            factory: None,
        }
    }

    /// Unique suite id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Foundation the suite runs against
    pub fn foundation(&self) -> FoundationKind {
        self.foundation
    }

    /// Whether a `before_all` hook is declared
    pub fn has_before_all(&self) -> bool {
        self.before_all.is_some()
    }

    /// Whether a `before_each` hook is declared
    pub fn has_before_each(&self) -> bool {
        self.before_each.is_some()
    }

    pub(crate) fn before_all(&self) -> Option<&SuiteFn> {
        self.before_all.as_ref()
    }

    pub(crate) fn before_each(&self) -> Option<&SuiteFn> {
        self.before_each.as_ref()
    }

    pub(crate) fn cases(&self, ctx: &Context) -> Vec<TestCase> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for SuiteDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteDeclaration")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("foundation", &self.foundation)
            .field("before_all", &self.before_all.is_some())
            .field("before_each", &self.before_each.is_some())
            .finish()
    }
}

/// Builder for [`SuiteDeclaration`].
pub struct SuiteBuilder {
    id: String,
    title: String,
    foundation: FoundationKind,
    before_all: Option<SuiteFn>,
    before_each: Option<SuiteFn>,
    cases: Vec<TestCase>,
    factory: Option<CaseFactory>,
}

impl SuiteBuilder {
    /// Hook run once after provisioning, before any case.
    pub fn before_all<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.before_all = Some(boxed(hook));
        self
    }

    /// Hook run before every case.
    pub fn before_each<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.before_each = Some(boxed(hook));
        self
    }

    /// Append a fixed case. Fixed cases run before factory-produced ones.
    pub fn case<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.cases.push(TestCase::new(name, body));
        self
    }

    /// Produce cases from the suite context once the foundation is up.
    pub fn test_cases<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Context) -> Vec<TestCase> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Finish the declaration.
    pub fn build(self) -> SuiteDeclaration {
        let fixed = self.cases;
        let produced = self.factory;
        let factory: CaseFactory = Arc::new(move |ctx: &Context| {
            let mut cases = fixed.clone();
            if let Some(produce) = &produced {
                cases.extend(produce(ctx));
            }
            cases
        });

        SuiteDeclaration {
            id: self.id,
            title: self.title,
            foundation: self.foundation,
            before_all: self.before_all,
            before_each: self.before_each,
            factory,
        }
    }
}
