//! Named pipeline steps.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::error::Result;
use crate::registry::Registry;

/// Type alias for async step functions.
pub type StepFn =
    Arc<dyn Fn(Arc<Registry>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// One named init or shutdown operation.
#[derive(Clone)]
pub struct Step {
    name: Cow<'static, str>,
    func: StepFn,
}

impl Step {
    pub fn new<F, Fut>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(Arc<Registry>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |registry| Box::pin(func(registry))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the step, scoped to `dispatch` when given.
    pub(crate) async fn run(&self, registry: &Arc<Registry>, dispatch: Option<Dispatch>) -> Result<()> {
        let fut = (self.func)(Arc::clone(registry));
        match dispatch {
            Some(dispatch) => fut.with_subscriber(dispatch).await,
            None => fut.await,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}
