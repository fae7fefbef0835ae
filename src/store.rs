// src/store.rs
//! Keyed JSON document store (user records keyed by contact).
//!
//! `FileDocumentStore` keeps one file per key and locks per key, so writers
//! for different users never serialize on each other. Writes go through a
//! temp file + rename.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::batch::write_json_atomic;

pub type Document = Map<String, Value>;

pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails if `key` already exists.
    fn create(&self, key: &str, doc: Document) -> Result<()>;
    fn find(&self, key: &str) -> Result<Option<Document>>;
    /// Merge `patch` into the top level of an existing document and return the result.
    fn update(&self, key: &str, patch: Document) -> Result<Document>;

    /// Append `item` to the array field `field`, creating the document if needed.
    fn push_to_array(&self, key: &str, field: &str, item: Value) -> Result<()>;
}

fn normalize_key(key: &str) -> Result<String> {
    let k = key.trim().to_lowercase();
    if k.is_empty() {
        bail!("empty store key");
    }
    Ok(k)
}

/// File-per-key store rooted at `dir`.
pub struct FileDocumentStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // only the map holds an idle lock; drop those so the map tracks live writers
        map.retain(|_, l| Arc::strong_count(l) > 1);
        map.entry(key.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // hex keeps arbitrary contacts (emails, phone numbers) filesystem-safe
        let mut name = String::with_capacity(key.len() * 2 + 5);
        for b in key.as_bytes() {
            use std::fmt::Write as _;
            let _ = write!(&mut name, "{:02x}", b);
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    fn read(&self, key: &str) -> Result<Option<Document>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => {
                let v: Value = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?;
                match v {
                    Value::Object(m) => Ok(Some(m)),
                    _ => Err(anyhow!("document {} is not an object", path.display())),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn write(&self, key: &str, doc: &Document) -> Result<()> {
        write_json_atomic(&self.path_for(key), doc)
    }
}

impl DocumentStore for FileDocumentStore {
    fn create(&self, key: &str, doc: Document) -> Result<()> {
        let key = normalize_key(key)?;
        let lock = self.key_lock(&key);
        let _g = lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.read(&key)?.is_some() {
            bail!("document already exists");
        }
        self.write(&key, &doc)
    }

    fn find(&self, key: &str) -> Result<Option<Document>> {
        let key = normalize_key(key)?;
        let lock = self.key_lock(&key);
        let _g = lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read(&key)
    }

    fn update(&self, key: &str, patch: Document) -> Result<Document> {
        let key = normalize_key(key)?;
        let lock = self.key_lock(&key);
        let _g = lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self
            .read(&key)?
            .ok_or_else(|| anyhow!("document not found"))?;
        doc.extend(patch);
        self.write(&key, &doc)?;
        Ok(doc)
    }

    fn push_to_array(&self, key: &str, field: &str, item: Value) -> Result<()> {
        let key = normalize_key(key)?;
        let lock = self.key_lock(&key);
        let _g = lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.read(&key)?.unwrap_or_default();
        push_item(&mut doc, field, item);
        self.write(&key, &doc)
    }
}

fn push_item(doc: &mut Document, field: &str, item: Value) {
    match doc.get_mut(field) {
        Some(Value::Array(items)) => items.push(item),
        _ => {
            doc.insert(field.to_string(), Value::Array(vec![item]));
        }
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn create(&self, key: &str, doc: Document) -> Result<()> {
        let key = normalize_key(key)?;
        let mut docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        if docs.contains_key(&key) {
            bail!("document already exists");
        }
        docs.insert(key, doc);
        Ok(())
    }

    fn find(&self, key: &str) -> Result<Option<Document>> {
        let key = normalize_key(key)?;
        let docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        Ok(docs.get(&key).cloned())
    }

    fn update(&self, key: &str, patch: Document) -> Result<Document> {
        let key = normalize_key(key)?;
        let mut docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        let doc = docs
            .get_mut(&key)
            .ok_or_else(|| anyhow!("document not found"))?;
        doc.extend(patch);
        Ok(doc.clone())
    }

    fn push_to_array(&self, key: &str, field: &str, item: Value) -> Result<()> {
        let key = normalize_key(key)?;
        let mut docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        push_item(docs.entry(key).or_default(), field, item);
        Ok(())
    }
}
