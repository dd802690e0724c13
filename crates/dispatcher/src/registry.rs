//! SourceSet - fetch capabilities selected by locator kind

use std::fmt;
use std::sync::Arc;

use contracts::{Fetcher, LocatorKind};
use tracing::{debug, warn};

/// One optional fetcher per [`LocatorKind`]
///
/// The set is closed: [`LocatorKind::Unrecognized`] never has a fetcher, so
/// such locators are answered with an unsupported error.
#[derive(Clone, Default)]
pub struct SourceSet {
    package: Option<Arc<dyn Fetcher>>,
    component: Option<Arc<dyn Fetcher>>,
    apk_file: Option<Arc<dyn Fetcher>>,
    plain_file: Option<Arc<dyn Fetcher>>,
    network: Option<Arc<dyn Fetcher>>,
    content_uri: Option<Arc<dyn Fetcher>>,
    resource: Option<Arc<dyn Fetcher>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, kind: LocatorKind, fetcher: Arc<dyn Fetcher>) -> Self {
        self.register(kind, fetcher);
        self
    }

    /// Register `fetcher` for `kind`, returning the one it replaces
    pub fn register(
        &mut self,
        kind: LocatorKind,
        fetcher: Arc<dyn Fetcher>,
    ) -> Option<Arc<dyn Fetcher>> {
        let Some(slot) = self.slot_mut(kind) else {
            warn!(fetcher = fetcher.name(), "Cannot register a fetcher for unrecognized locators");
            return None;
        };
        debug!(%kind, fetcher = fetcher.name(), "Fetcher registered");
        slot.replace(fetcher)
    }

    fn slot_mut(&mut self, kind: LocatorKind) -> Option<&mut Option<Arc<dyn Fetcher>>> {
        match kind {
            LocatorKind::Package => Some(&mut self.package),
            LocatorKind::Component => Some(&mut self.component),
            LocatorKind::ApkFile => Some(&mut self.apk_file),
            LocatorKind::PlainFile => Some(&mut self.plain_file),
            LocatorKind::Network => Some(&mut self.network),
            LocatorKind::ContentUri => Some(&mut self.content_uri),
            LocatorKind::Resource => Some(&mut self.resource),
            LocatorKind::Unrecognized => None,
        }
    }

    /// Fetcher responsible for `kind`
    pub fn fetcher_for(&self, kind: LocatorKind) -> Option<&Arc<dyn Fetcher>> {
        match kind {
            LocatorKind::Package => self.package.as_ref(),
            LocatorKind::Component => self.component.as_ref(),
            LocatorKind::ApkFile => self.apk_file.as_ref(),
            LocatorKind::PlainFile => self.plain_file.as_ref(),
            LocatorKind::Network => self.network.as_ref(),
            LocatorKind::ContentUri => self.content_uri.as_ref(),
            LocatorKind::Resource => self.resource.as_ref(),
            LocatorKind::Unrecognized => None,
        }
    }

    /// Kinds that have a fetcher
    pub fn kinds(&self) -> Vec<LocatorKind> {
        LocatorKind::ALL
            .into_iter()
            .filter(|kind| self.fetcher_for(*kind).is_some())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }

    /// Call [`Fetcher::shutdown`] once per distinct fetcher
    pub fn shutdown_all(&self) {
        let mut released: Vec<&Arc<dyn Fetcher>> = Vec::new();
        for kind in LocatorKind::ALL {
            let Some(fetcher) = self.fetcher_for(kind) else {
                continue;
            };
            if released.iter().any(|seen| Arc::ptr_eq(seen, fetcher)) {
                continue;
            }
            fetcher.shutdown();
            released.push(fetcher);
        }
        debug!(fetchers = released.len(), "Fetchers released");
    }
}

impl fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in LocatorKind::ALL {
            if let Some(fetcher) = self.fetcher_for(kind) {
                map.entry(&kind, &fetcher.name());
            }
        }
        map.finish()
    }
}
