//! An in-process [`SearchBackend`].
//!
//! Keeps templates and documents in memory and records every call, which makes it possible to
//! assert on what the logger did without a running cluster. Failures can be switched on to
//! simulate an unavailable cluster.

use crate::backend::SearchBackend;
use crate::opensearch::template::IndexTemplate;
use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A call received by the [`InMemoryBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    TemplateExists(String),
    DeleteTemplate(String),
    PutTemplate(String),
    IndexDocument(String),
}

/// A document stored by the [`InMemoryBackend`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub index: String,
    pub source: Value,
}

#[derive(Default)]
struct State {
    templates: BTreeMap<String, IndexTemplate>,
    documents: Vec<StoredDocument>,
    calls: Vec<BackendCall>,
}

/// Search backend which lives entirely in memory.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    fail_templates: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend which already knows the given template.
    pub fn with_template(template: IndexTemplate) -> Self {
        let backend = Self::default();
        backend
            .lock()
            .templates
            .insert(template.name.clone(), template);
        backend
    }

    /// Makes all template operations fail (or succeed again).
    pub fn fail_templates(&self, fail: bool) {
        self.fail_templates.store(fail, Ordering::Relaxed);
    }

    /// Makes all document writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Returns the installed template with the given name.
    pub fn template(&self, name: &str) -> Option<IndexTemplate> {
        self.lock().templates.get(name).cloned()
    }

    /// Returns all documents stored so far, in write order.
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.lock().documents.clone()
    }

    /// Returns all calls received so far, in call order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the recorded state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_templates_available(&self) -> anyhow::Result<()> {
        if self.fail_templates.load(Ordering::Relaxed) {
            bail!("Template API unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn template_exists(&self, name: &str) -> anyhow::Result<bool> {
        let mut state = self.lock();
        state.calls.push(BackendCall::TemplateExists(name.to_string()));
        self.check_templates_available()?;

        Ok(state.templates.contains_key(name))
    }

    async fn delete_template(&self, name: &str) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::DeleteTemplate(name.to_string()));
        self.check_templates_available()?;

        if state.templates.remove(name).is_none() {
            bail!("Unknown index template: {}", name);
        }
        Ok(())
    }

    async fn put_template(&self, template: &IndexTemplate) -> anyhow::Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(BackendCall::PutTemplate(template.name.clone()));
        self.check_templates_available()?;

        state
            .templates
            .insert(template.name.clone(), template.clone());
        Ok(())
    }

    async fn index_document(&self, index: &str, document: &Value) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::IndexDocument(index.to_string()));
        if self.fail_writes.load(Ordering::Relaxed) {
            bail!("Cluster unavailable");
        }

        state.documents.push(StoredDocument {
            index: index.to_string(),
            source: document.clone(),
        });
        Ok(())
    }
}
