//! In-memory audit log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use suncube_core::result::AppResult;
use suncube_entity::audit::{AuditEntry, NewAuditEntry};

use crate::repositories::AuditSink;

/// Append-only audit log held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryAuditLog {
    /// Create an empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, oldest first.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::now_v7(),
            actor: entry.actor,
            action: entry.action,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            meta: entry.meta,
            created_at: Utc::now(),
        };
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn find_by_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.resource_type == resource_type && e.resource_id == resource_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_resource_newest_first() {
        let log = MemoryAuditLog::new();
        for n in 0..3 {
            log.record(NewAuditEntry {
                actor: None,
                action: "GENERATE_INVOICE".to_string(),
                resource_type: "payments".to_string(),
                resource_id: if n == 1 { "other" } else { "p1" }.to_string(),
                meta: serde_json::json!({ "n": n }),
            })
            .await
            .unwrap();
        }

        let found = log.find_by_resource("payments", "p1").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].meta["n"], 2);
        assert_eq!(found[1].meta["n"], 0);
    }
}
