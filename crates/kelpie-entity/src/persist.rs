//! Generic persistence over the central store.
//!
//! [`Entity`] is what a concrete type implements: its descriptor table,
//! its key path, and plain accessors over its fields. [`Persist`] is
//! the machinery every entity gets for free: render-to-leaves, content
//! hashing, hash-deduplicated save, lenient load, existence probing.
//!
//! The content hash is the digest of the entity's sorted-key JSON
//! document with the `hash` and `updated_at` bookkeeping leaves
//! excluded, so those two never participate in their own change
//! detection. Entities are re-saved frequently inside polling loops;
//! the hash check is what keeps that to at most one effective write per
//! distinct state.

use crate::context::StoreContext;
use crate::def::{EntityDef, FieldKind};
use crate::value::FieldValue;
use async_trait::async_trait;
use chrono::Utc;
use kelpie_common::{Notice, Priority};
use kelpie_store::Result;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// A typed record persisted as individual leaves under a key path.
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    /// Static descriptor table for this entity type.
    fn def() -> &'static EntityDef;

    /// Slash-delimited path the entity's leaves live under.
    fn key_path(&self) -> String;

    /// Currently-set fields. Unset fields are simply absent.
    fn fields(&self) -> BTreeMap<&'static str, FieldValue>;

    /// Set a field from its stored value. Unknown names are ignored.
    fn set_field(&mut self, name: &str, value: FieldValue);

    /// Explicit copy constructor carrying only the identity fields that
    /// address the entity, used as the target of a load.
    fn fresh(&self) -> Self;

    /// Hash recorded by the last save/load, if any.
    fn stored_hash(&self) -> Option<&str>;
    fn set_stored_hash(&mut self, hash: Option<String>);

    /// `updated_at` timestamp recorded by the last save/load, if any.
    fn updated_at(&self) -> Option<&str>;
    fn set_updated_at(&mut self, at: Option<String>);
}

/// One leaf produced by rendering an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedField {
    pub key: String,
    pub value: String,
    pub name: &'static str,
    pub is_dir: bool,
}

/// Options for [`Persist::save_with`].
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Backfill unset in-memory fields from the stored entity before
    /// writing, so partial updates never blank out untouched leaves.
    pub update: bool,
    /// Refresh the entity subtree's lease, even when the write is
    /// skipped.
    pub ttl: Option<Duration>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            update: true,
            ttl: None,
        }
    }
}

/// Generic persistence operations, implemented for every [`Entity`].
#[async_trait]
pub trait Persist: Entity {
    /// Render the entity into its flat list of leaves.
    ///
    /// `List`/`Json` fields are JSON-encoded; an encoding failure is
    /// reported through the event sink and the field is skipped rather
    /// than aborting the render.
    fn render(&self, ctx: &StoreContext) -> Vec<RenderedField> {
        let path = self.key_path();
        let mut rendered = Vec::new();
        for (name, value) in self.fields() {
            let Some(def) = Self::def().field(name) else {
                continue;
            };
            if let (FieldKind::Dir, FieldValue::Dir(map)) = (def.kind, &value) {
                for (sub, v) in map {
                    rendered.push(RenderedField {
                        key: format!("{}/{}/{}", path, name, sub),
                        value: v.clone(),
                        name: def.name,
                        is_dir: true,
                    });
                }
                continue;
            }
            match value.encode() {
                Ok(encoded) => rendered.push(RenderedField {
                    key: format!("{}/{}", path, name),
                    value: encoded,
                    name: def.name,
                    is_dir: false,
                }),
                Err(err) => ctx.events.publish_fault(
                    Notice::new(
                        Priority::Error,
                        &ctx.publisher,
                        format!(
                            "failed to encode field '{}' of {}, skipping it",
                            name,
                            Self::def().name
                        ),
                    ),
                    &err,
                ),
            }
        }
        rendered
    }

    /// SHA-256 hex digest of the entity's sorted-key JSON document,
    /// with `hash` and `updated_at` excluded.
    fn content_hash(&self) -> String {
        let doc: BTreeMap<&str, serde_json::Value> = self
            .fields()
            .into_iter()
            .map(|(name, value)| (name, value.json_value()))
            .collect();
        // Serializing a string-keyed map of JSON values cannot fail.
        let json = serde_json::to_string(&doc).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Save with default options (backfill on, no lease).
    async fn save(&mut self, ctx: &StoreContext) -> Result<bool> {
        self.save_with(ctx, SaveOptions::default()).await
    }

    /// Persist the entity, returning whether anything was written.
    ///
    /// If the content hash matches the stored hash the write is skipped
    /// entirely (the lease is still refreshed when a ttl is given) and
    /// `Ok(false)` is returned.
    async fn save_with(&mut self, ctx: &StoreContext, opts: SaveOptions) -> Result<bool> {
        let path = self.key_path();
        let hash_key = format!("{}/hash", path);

        let current_hash = self.content_hash();
        let stored_hash = ctx.store.read(&hash_key).await?;
        if stored_hash.as_deref() == Some(current_hash.as_str()) {
            debug!(entity = Self::def().name, key = %path, "unchanged, skipping save");
            if let Some(ttl) = opts.ttl {
                ctx.store.refresh(&path, ttl).await?;
            }
            self.set_stored_hash(Some(current_hash));
            return Ok(false);
        }

        if opts.update {
            let stored = self.load(ctx).await?;
            let mine = self.fields();
            for (name, value) in stored.fields() {
                if !mine.contains_key(name) {
                    self.set_field(name, value);
                }
            }
        }

        // The stored hash reflects the full persisted state, including
        // backfilled fields, so the next unchanged save is a no-op.
        let final_hash = self.content_hash();
        self.set_updated_at(Some(Utc::now().to_rfc3339()));

        for field in self.render(ctx) {
            debug!(key = %field.key, "writing entity leaf");
            ctx.store.write(&field.key, &field.value, true).await?;
        }
        ctx.store.write(&hash_key, &final_hash, true).await?;
        let updated_at = self.updated_at().unwrap_or_default().to_string();
        ctx.store
            .write(&format!("{}/updated_at", path), &updated_at, true)
            .await?;

        if let Some(ttl) = opts.ttl {
            ctx.store.refresh(&path, ttl).await?;
        }
        self.set_stored_hash(Some(final_hash));
        Ok(true)
    }

    /// Load the entity from the store.
    ///
    /// Fast path: if the in-memory content hash equals the stored hash
    /// the instance is returned unchanged. Otherwise every leaf is
    /// read into a fresh copy; absent leaves stay unset, directory
    /// fields merge their children, and a malformed stored value is
    /// reported but leaves the field undecoded instead of aborting.
    async fn load(&self, ctx: &StoreContext) -> Result<Self> {
        let path = self.key_path();
        let hash_key = format!("{}/hash", path);

        let stored_hash = ctx.store.read(&hash_key).await?;
        if let Some(ref stored) = stored_hash {
            if *stored == self.content_hash() {
                return Ok(self.clone());
            }
        }

        let mut loaded = self.fresh();
        for def in Self::def().fields {
            let key = format!("{}/{}", path, def.name);
            if def.kind == FieldKind::Dir {
                let children = ctx.store.read_dir(&key).await?;
                let map: BTreeMap<String, String> = children
                    .into_iter()
                    .filter(|c| !c.dir)
                    .map(|c| {
                        let segment = c.segment().to_string();
                        (segment, c.value)
                    })
                    .collect();
                if !map.is_empty() {
                    loaded.set_field(def.name, FieldValue::Dir(map));
                }
                continue;
            }

            let Some(raw) = ctx.store.read(&key).await? else {
                continue;
            };
            match FieldValue::decode(def.kind, &raw) {
                Ok(value) => loaded.set_field(def.name, value),
                Err(err) => ctx.events.publish_fault(
                    Notice::new(
                        Priority::Error,
                        &ctx.publisher,
                        format!(
                            "failed to decode field '{}' of {} at {}, leaving it unset",
                            def.name,
                            Self::def().name,
                            key
                        ),
                    ),
                    &err,
                ),
            }
        }

        loaded.set_stored_hash(stored_hash);
        loaded.set_updated_at(ctx.store.read(&format!("{}/updated_at", path)).await?);
        Ok(loaded)
    }

    /// Whether any leaf exists under the entity's path.
    async fn exists(&self, ctx: &StoreContext) -> Result<bool> {
        Ok(!ctx.store.read_dir(&self.key_path()).await?.is_empty())
    }
}

impl<T: Entity> Persist for T {}

/// Entity types whose instances all live under one parent directory.
pub trait Enumerable: Entity {
    /// Parent path the instances are enumerated under.
    fn parent_path() -> &'static str;

    /// Construct an addressable instance from a child path segment.
    fn from_segment(segment: &str) -> Self;
}

/// Bulk loading for [`Enumerable`] entity types.
#[async_trait]
pub trait LoadAll: Enumerable {
    /// Materialize one loaded instance per child of the parent path.
    /// An absent parent yields an empty vector.
    async fn load_all(ctx: &StoreContext) -> Result<Vec<Self>> {
        let mut loaded = Vec::new();
        for child in ctx.store.read_dir(Self::parent_path()).await? {
            if !child.dir {
                continue;
            }
            let instance = Self::from_segment(child.segment());
            loaded.push(instance.load(ctx).await?);
        }
        Ok(loaded)
    }
}

impl<T: Enumerable> LoadAll for T {}
