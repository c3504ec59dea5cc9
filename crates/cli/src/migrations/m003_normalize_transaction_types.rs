//! Transaction types were free text in early imports ("BUY", "Purchase", "DIV").
//! One-way: the original spelling is not kept.

use async_trait::async_trait;
use folio_migrations::{DataStore, Migration};
use serde_json::Value;

use super::object_mut;

/// Maps transaction `type` values onto `buy`, `sell`, `dividend`, `deposit`, `withdrawal`
pub struct NormalizeTransactionTypes;

fn canonical_type(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "buy" | "purchase" | "bought" => Some("buy"),
        "sell" | "sale" | "sold" => Some("sell"),
        "dividend" | "div" => Some("dividend"),
        "deposit" | "contribution" => Some("deposit"),
        "withdrawal" | "withdraw" => Some("withdrawal"),
        _ => None,
    }
}

#[async_trait]
impl Migration for NormalizeTransactionTypes {
    fn name(&self) -> &str {
        "003_normalize_transaction_types"
    }

    async fn apply(&self, store: &dyn DataStore) -> anyhow::Result<()> {
        let mut updated = 0;

        for mut doc in store.find_all("transactions").await? {
            let transaction = object_mut("transactions", &doc.key, &mut doc.body)?;
            let raw = match transaction.get("type") {
                Some(Value::String(raw)) => raw.clone(),
                _ => anyhow::bail!("transaction {} has no type", doc.key),
            };
            let canonical = canonical_type(&raw).ok_or_else(|| {
                anyhow::anyhow!("transaction {} has unknown type '{}'", doc.key, raw)
            })?;

            if raw != canonical {
                transaction.insert("type".to_string(), Value::from(canonical));
                store.put("transactions", &doc.key, doc.body).await?;
                updated += 1;
            }
        }

        tracing::info!(count = updated, "Normalized transaction types");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_migrations::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_canonical_type() {
        assert_eq!(canonical_type(" Purchase "), Some("buy"));
        assert_eq!(canonical_type("DIV"), Some("dividend"));
        assert_eq!(canonical_type("split"), None);
    }

    #[tokio::test]
    async fn test_normalizes_known_types() {
        let store = MemoryStore::new();
        store.put("transactions", "t1", json!({ "type": "BUY" })).await.unwrap();
        store.put("transactions", "t2", json!({ "type": "sell" })).await.unwrap();

        NormalizeTransactionTypes.apply(&store).await.unwrap();
        let t1 = store.find_one("transactions", "t1").await.unwrap().unwrap();
        assert_eq!(t1.body["type"], "buy");
        // Already canonical documents are left alone
        assert_eq!(store.write_count(), 3);
        assert!(!NormalizeTransactionTypes.is_reversible());
    }

    #[tokio::test]
    async fn test_unknown_type_fails() {
        let store = MemoryStore::new();
        store.put("transactions", "t1", json!({ "type": "split" })).await.unwrap();

        let err = NormalizeTransactionTypes.apply(&store).await.unwrap_err();
        assert!(err.to_string().contains("unknown type 'split'"));
    }
}
