//! Routes store operations to a primary backend, falling back to a secondary
//! backend when the primary is unavailable.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::events::{Emitter, Event, EventKind};

use super::{CURRENT_SCHEMA_VERSION, DurableStore, PersistedDocument, StoreError};

/// Wraps a primary and a fallback [`DurableStore`] behind the primary/
/// fallback routing rule: try the primary first; if it reports itself
/// unavailable, route to the fallback and emit a one-time warning event.
pub struct StoreBridge {
    primary: Box<dyn DurableStore>,
    fallback: Box<dyn DurableStore>,
    warned: AtomicBool,
}

impl StoreBridge {
    pub fn new(primary: Box<dyn DurableStore>, fallback: Box<dyn DurableStore>) -> Self {
        Self {
            primary,
            fallback,
            warned: AtomicBool::new(false),
        }
    }

    async fn active_store(&self, emitter: Option<&Emitter>, harness_id: &str) -> &dyn DurableStore {
        if self.primary.is_available().await {
            self.primary.as_ref()
        } else {
            if !self.warned.swap(true, Ordering::SeqCst) {
                if let Some(emitter) = emitter {
                    emitter
                        .emit(Event::new(
                            harness_id,
                            chrono_now(),
                            EventKind::StoreDegraded {
                                reason: "primary store unavailable; routing to fallback".to_owned(),
                            },
                        ))
                        .await;
                }
            }
            self.fallback.as_ref()
        }
    }

    pub async fn persist(
        &self,
        harness_id: &str,
        json: serde_json::Value,
        emitter: Option<&Emitter>,
    ) -> Result<(), StoreError> {
        let doc = PersistedDocument::new(json)?;
        if doc.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaVersionMismatch {
                found: doc.schema_version,
                expected: CURRENT_SCHEMA_VERSION,
            });
        }
        let store = self.active_store(emitter, harness_id).await;
        match store.persist(harness_id, &doc).await {
            Ok(()) => Ok(()),
            Err(_) if !std::ptr::eq(store, self.fallback.as_ref()) => {
                self.fallback.persist(harness_id, &doc).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn restore(
        &self,
        harness_id: &str,
        emitter: Option<&Emitter>,
    ) -> Result<Option<PersistedDocument>, StoreError> {
        let store = self.active_store(emitter, harness_id).await;
        let result = store.restore(harness_id).await;
        match result {
            Ok(doc) => {
                if let Some(doc) = &doc {
                    if doc.schema_version != CURRENT_SCHEMA_VERSION {
                        return Err(StoreError::SchemaVersionMismatch {
                            found: doc.schema_version,
                            expected: CURRENT_SCHEMA_VERSION,
                        });
                    }
                }
                Ok(doc)
            }
            Err(_) if !std::ptr::eq(store, self.fallback.as_ref()) => {
                self.fallback.restore(harness_id).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, harness_id: &str) -> Result<(), StoreError> {
        let primary_result = self.primary.delete(harness_id).await;
        let fallback_result = self.fallback.delete(harness_id).await;
        primary_result.or(fallback_result)
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        if self.primary.is_available().await {
            self.primary.list_ids().await
        } else {
            self.fallback.list_ids().await
        }
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
