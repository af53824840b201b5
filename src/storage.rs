//! Sled-backed store for the single `AppData` document.
//!
//! The whole application state is one JSON value under one key. Writers send
//! path-keyed partial updates (`DocumentUpdate`) which are applied with a
//! compare-and-swap loop, so two writers touching different paths never lose
//! each other's changes and two writers touching the same path resolve as
//! last-write-wins. Every committed write publishes the new snapshot to
//! subscribers, replacing what they held.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use sled::Db;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{AppData, User};

const DOCUMENT_KEY: &[u8] = b"main";

/// Latest known snapshot; `None` until the document is initialized.
pub type Snapshot = Option<Arc<AppData>>;

/// Authoritative store for the application document.
pub trait Repository: Send + Sync {
    /// Current committed document, if initialized.
    fn snapshot(&self) -> Result<Snapshot>;

    /// Live view of the document. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Snapshot>;

    /// Overwrite the whole document.
    fn replace(&self, data: &AppData) -> Result<()>;

    /// Apply a partial update atomically against the current document.
    fn apply(&self, update: &DocumentUpdate) -> Result<()>;
}

/// Dotted path into the document, e.g. `hostels.h-1.floors.f-2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn hostel(hostel_id: &str) -> Self {
        Self::new(["hostels", hostel_id])
    }

    pub fn floor(hostel_id: &str, floor_id: &str) -> Self {
        Self::new(["hostels", hostel_id, "floors", floor_id])
    }

    pub fn room(hostel_id: &str, floor_id: &str, room_id: &str) -> Self {
        Self::new(["hostels", hostel_id, "floors", floor_id, "rooms", room_id])
    }

    pub fn room_tenant_ids(hostel_id: &str, floor_id: &str, room_id: &str) -> Self {
        Self::room(hostel_id, floor_id, room_id).child("tenantIds")
    }

    pub fn tenant(tenant_id: &str) -> Self {
        Self::new(["tenants", tenant_id])
    }

    pub fn payment(payment_id: &str) -> Self {
        Self::new(["payments", payment_id])
    }

    pub fn report(report_id: &str) -> Self {
        Self::new(["reportHistory", report_id])
    }

    pub fn audit_logs() -> Self {
        Self::new(["auditLogs"])
    }

    pub fn child(mut self, segment: &str) -> Self {
        self.0.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Write the value, creating missing parent maps.
    Set(Value),
    /// Add each value to the array unless already present.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value; missing path is a no-op.
    ArrayRemove(Vec<Value>),
}

/// Ordered set of path operations committed as one write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    ops: Vec<(FieldPath, FieldOp)>,
}

impl DocumentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(mut self, path: FieldPath, value: &T) -> Result<Self> {
        self.ops.push((path, FieldOp::Set(serde_json::to_value(value)?)));
        Ok(self)
    }

    pub fn array_union<T: Serialize>(mut self, path: FieldPath, value: &T) -> Result<Self> {
        self.ops
            .push((path, FieldOp::ArrayUnion(vec![serde_json::to_value(value)?])));
        Ok(self)
    }

    pub fn array_remove<T: Serialize>(mut self, path: FieldPath, value: &T) -> Result<Self> {
        self.ops
            .push((path, FieldOp::ArrayRemove(vec![serde_json::to_value(value)?])));
        Ok(self)
    }

    pub fn ops(&self) -> &[(FieldPath, FieldOp)] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation, in order, to a raw document.
    pub fn apply_to(&self, doc: &mut Value) -> Result<()> {
        for (path, op) in &self.ops {
            apply_op(doc, path, op)?;
        }
        Ok(())
    }
}

fn apply_op(doc: &mut Value, path: &FieldPath, op: &FieldOp) -> Result<()> {
    let Some((leaf, parents)) = path.segments().split_last() else {
        return Err(Error::validation("empty field path"));
    };

    let parent = match op {
        FieldOp::ArrayRemove(_) => match lookup_mut(doc, parents) {
            Some(parent) => parent,
            None => return Ok(()),
        },
        _ => ensure_map_path(doc, parents, path)?,
    };

    let Some(map) = parent.as_object_mut() else {
        return Err(Error::validation(format!("{path} does not address a map entry")));
    };

    match op {
        FieldOp::Set(value) => {
            map.insert(leaf.clone(), value.clone());
        }
        FieldOp::ArrayUnion(values) => {
            let slot = map
                .entry(leaf.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
        }
        FieldOp::ArrayRemove(values) => {
            if let Some(Value::Array(items)) = map.get_mut(leaf) {
                items.retain(|item| !values.contains(item));
            }
        }
    }
    Ok(())
}

fn lookup_mut<'a>(doc: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(doc, |node, segment| node.as_object_mut()?.get_mut(segment))
}

fn ensure_map_path<'a>(
    doc: &'a mut Value,
    segments: &[String],
    full_path: &FieldPath,
) -> Result<&'a mut Value> {
    let mut node = doc;
    for segment in segments {
        let map = node
            .as_object_mut()
            .ok_or_else(|| Error::validation(format!("{full_path} crosses a non-map value")))?;
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
    }
    Ok(node)
}

/// Sled-backed `Repository`, plus the login tree.
#[derive(Clone)]
pub struct Storage {
    #[allow(dead_code)] // kept so the database outlives every tree handle
    db: Db,
    doc_tree: sled::Tree,
    user_tree: sled::Tree,
    updates: Arc<watch::Sender<Snapshot>>,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Throwaway in-memory database, removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let doc_tree = db.open_tree("state")?;
        let user_tree = db.open_tree("users")?;
        let current = load_document(&doc_tree)?.map(Arc::new);
        let (updates, _) = watch::channel(current);
        Ok(Self {
            db,
            doc_tree,
            user_tree,
            updates: Arc::new(updates),
        })
    }

    /// Re-read the committed document and push it to subscribers.
    ///
    /// Reading inside the channel lock means the last publisher always
    /// observes the newest commit, so subscribers never go backwards.
    fn publish(&self) {
        let tree = &self.doc_tree;
        self.updates.send_if_modified(|current| match load_document(tree) {
            Ok(latest) => {
                *current = latest.map(Arc::new);
                true
            }
            Err(e) => {
                warn!(error = %e, "skipping snapshot publish");
                false
            }
        });
    }

    pub fn create_user(&self, user: &User) -> Result<()> {
        let bytes = serde_json::to_vec(user)?;
        match self
            .user_tree
            .compare_and_swap(user.email.as_bytes(), None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::Conflict(format!("user {} already exists", user.email))),
        }
    }

    pub fn get_user(&self, email: &str) -> Result<Option<User>> {
        match self.user_tree.get(email.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.doc_tree.flush()?;
        self.user_tree.flush()?;
        Ok(())
    }
}

fn load_document(tree: &sled::Tree) -> Result<Option<AppData>> {
    match tree.get(DOCUMENT_KEY)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

impl Repository for Storage {
    fn snapshot(&self) -> Result<Snapshot> {
        Ok(load_document(&self.doc_tree)?.map(Arc::new))
    }

    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.updates.subscribe()
    }

    fn replace(&self, data: &AppData) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        self.doc_tree.insert(DOCUMENT_KEY, bytes)?;
        self.publish();
        Ok(())
    }

    fn apply(&self, update: &DocumentUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let current = self
                .doc_tree
                .get(DOCUMENT_KEY)?
                .ok_or_else(|| Error::not_found("state document is not initialized"))?;

            let mut doc: Value = serde_json::from_slice(&current)?;
            update.apply_to(&mut doc)?;
            // Refuse writes that would leave the document unreadable.
            let _: AppData = serde_json::from_value(doc.clone())?;
            let bytes = serde_json::to_vec(&doc)?;

            match self
                .doc_tree
                .compare_and_swap(DOCUMENT_KEY, Some(current), Some(bytes))?
            {
                Ok(()) => {
                    debug!(ops = update.ops().len(), attempts, "document updated");
                    self.publish();
                    return Ok(());
                }
                Err(_) => debug!(attempts, "concurrent write, retrying update"),
            }
        }
    }
}
