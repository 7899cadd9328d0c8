use async_trait::async_trait;
use std::sync::Arc;

/// A resource that must be given back when its scope ends.
///
/// `release` may be called more than once and must be a no-op after the
/// first successful call.
#[async_trait]
pub trait Release: Send + Sync {
    fn label(&self) -> String;

    async fn release(&self) -> anyhow::Result<()>;
}

pub struct ResourceScope {
    name: String,
    resources: Vec<Arc<dyn Release>>,
    closed: bool,
}

impl ResourceScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a resource and get back a shared handle to it.
    pub fn adopt<R: Release + 'static>(&mut self, resource: R) -> Arc<R> {
        let resource = Arc::new(resource);
        self.push(resource.clone());
        resource
    }

    /// Register an already shared resource.
    pub fn push(&mut self, resource: Arc<dyn Release>) {
        tracing::debug!(scope = %self.name, resource = %resource.label(), "resource acquired");
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release every held resource in reverse acquisition order. Failures are
    /// logged and do not stop the remaining releases. Returns the number of
    /// failed releases.
    pub async fn close(mut self) -> usize {
        self.closed = true;
        let resources = std::mem::take(&mut self.resources);
        release_all(&self.name, resources).await
    }
}

async fn release_all(scope: &str, resources: Vec<Arc<dyn Release>>) -> usize {
    let mut failures = 0;
    for resource in resources.into_iter().rev() {
        match resource.release().await {
            Ok(()) => tracing::debug!(scope, resource = %resource.label(), "resource released"),
            Err(e) => {
                failures += 1;
                tracing::error!(scope, resource = %resource.label(), "release failed: {e:#}");
            }
        }
    }
    failures
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        if self.closed || self.resources.is_empty() {
            return;
        }

        let resources = std::mem::take(&mut self.resources);
        let name = self.name.clone();
        tracing::warn!(
            scope = %name,
            count = resources.len(),
            "scope dropped without close, scheduling release"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_all(&name, resources).await;
                });
            }
            Err(_) => {
                tracing::error!(scope = %name, "no runtime available, resources leaked");
            }
        }
    }
}
