//! Run-list construction
//!
//! A [`DeclarationProvider`] fills a [`RunListBuilder`] with resources in
//! declaration order. That order is the order the executor applies them in.

use crate::notify::resolve_subscriptions;
use crate::resource::{Resource, ResourceId};
use anyhow::Result;
use std::collections::HashSet;

/// Source of resource declarations (a recipe file, a test fixture, ...)
pub trait DeclarationProvider<R> {
    fn declare(&self, builder: &mut RunListBuilder<R>) -> Result<()>;
}

/// Accumulates declared resources
#[derive(Debug)]
pub struct RunListBuilder<R> {
    resources: Vec<R>,
}

impl<R> Default for RunListBuilder<R> {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
        }
    }
}

impl<R: Resource> RunListBuilder<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource, returning its position
    pub fn add(&mut self, resource: R) -> usize {
        log::trace!("declared {}", resource.id());
        self.resources.push(resource);
        self.resources.len() - 1
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn build(self) -> RunList<R> {
        RunList::new(self.resources)
    }
}

/// Resources in declaration order
#[derive(Debug)]
pub struct RunList<R> {
    resources: Vec<R>,
    /// Subscriptions folded into notifications, once resolved
    resolved_subscriptions: Option<usize>,
}

impl<R: Resource> RunList<R> {
    pub fn new(resources: Vec<R>) -> Self {
        Self {
            resources,
            resolved_subscriptions: None,
        }
    }

    /// Build a run-list from everything `provider` declares
    pub fn from_provider<P: DeclarationProvider<R> + ?Sized>(provider: &P) -> Result<Self> {
        let mut builder = RunListBuilder::new();
        provider.declare(&mut builder)?;
        Ok(builder.build())
    }

    pub fn resources(&self) -> &[R] {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut [R] {
        &mut self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Fold subscriptions into notifications, at most once per run-list.
    ///
    /// Later calls return the first call's count without touching the
    /// resources, so running a list again never duplicates notifications.
    pub fn resolve_subscriptions(&mut self) -> usize {
        *self
            .resolved_subscriptions
            .get_or_insert_with(|| resolve_subscriptions(&mut self.resources))
    }

    /// First resource declared with `id`
    pub fn find(&self, id: &ResourceId) -> Option<&R> {
        self.resources.iter().find(|r| &r.id() == id)
    }

    /// Ids declared more than once, each listed once in first-seen order
    pub fn duplicate_ids(&self) -> Vec<ResourceId> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();
        for resource in &self.resources {
            let id = resource.id();
            if !seen.insert(id.clone()) && reported.insert(id.clone()) {
                duplicates.push(id);
            }
        }
        duplicates
    }

    pub fn into_inner(self) -> Vec<R> {
        self.resources
    }
}
