//! Assets used `ticker` before the market-data integration settled on `symbol`.

use async_trait::async_trait;
use folio_migrations::{DataStore, Migration};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{object_mut, STATE_COLLECTION};

const NAME: &str = "002_rename_asset_ticker_to_symbol";

/// Renames `assets.ticker` to `assets.symbol`
pub struct RenameAssetTickerToSymbol;

/// What `apply` changed, so `revert` touches nothing else
#[derive(Debug, Default, Serialize, Deserialize)]
struct RenameState {
    /// Assets whose `ticker` became `symbol`
    renamed: Vec<String>,
    /// Assets that already had a `symbol`; their dropped `ticker` by key
    dropped: Vec<(String, Value)>,
}

#[async_trait]
impl Migration for RenameAssetTickerToSymbol {
    fn name(&self) -> &str {
        NAME
    }

    async fn apply(&self, store: &dyn DataStore) -> anyhow::Result<()> {
        let mut state = RenameState::default();

        for mut doc in store.find_all("assets").await? {
            let asset = object_mut("assets", &doc.key, &mut doc.body)?;
            let Some(ticker) = asset.remove("ticker") else {
                continue;
            };

            // An existing symbol wins; the ticker is still dropped
            if asset.contains_key("symbol") {
                state.dropped.push((doc.key.clone(), ticker));
            } else {
                asset.insert("symbol".to_string(), ticker);
                state.renamed.push(doc.key.clone());
            }
            store.put("assets", &doc.key, doc.body).await?;
        }

        tracing::info!(
            renamed = state.renamed.len(),
            dropped = state.dropped.len(),
            "Renamed asset ticker to symbol"
        );
        store
            .put(STATE_COLLECTION, NAME, serde_json::to_value(&state)?)
            .await?;
        Ok(())
    }

    fn is_reversible(&self) -> bool {
        true
    }

    async fn revert(&self, store: &dyn DataStore) -> anyhow::Result<()> {
        let doc = store
            .find_one(STATE_COLLECTION, NAME)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no record of which assets were renamed"))?;
        let state: RenameState = serde_json::from_value(doc.body)?;

        for key in state.renamed {
            if let Some(mut doc) = store.find_one("assets", &key).await? {
                let asset = object_mut("assets", &key, &mut doc.body)?;
                if let Some(symbol) = asset.remove("symbol") {
                    asset.insert("ticker".to_string(), symbol);
                    store.put("assets", &key, doc.body).await?;
                }
            }
        }

        for (key, ticker) in state.dropped {
            if let Some(mut doc) = store.find_one("assets", &key).await? {
                object_mut("assets", &key, &mut doc.body)?.insert("ticker".to_string(), ticker);
                store.put("assets", &key, doc.body).await?;
            }
        }

        store.delete(STATE_COLLECTION, NAME).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_migrations::MemoryStore;
    use serde_json::json;

    async fn body(store: &MemoryStore, key: &str) -> Value {
        store.find_one("assets", key).await.unwrap().unwrap().body
    }

    #[tokio::test]
    async fn test_rename_round_trip() {
        let store = MemoryStore::new();
        store
            .put("assets", "a1", json!({ "ticker": "VTI", "units": 12 }))
            .await
            .unwrap();
        store
            .put("assets", "a2", json!({ "ticker": "OLD", "symbol": "NEW" }))
            .await
            .unwrap();

        RenameAssetTickerToSymbol.apply(&store).await.unwrap();
        assert_eq!(body(&store, "a1").await, json!({ "symbol": "VTI", "units": 12 }));
        assert_eq!(body(&store, "a2").await, json!({ "symbol": "NEW" }));

        RenameAssetTickerToSymbol.revert(&store).await.unwrap();
        assert_eq!(body(&store, "a1").await, json!({ "ticker": "VTI", "units": 12 }));
        assert_eq!(body(&store, "a2").await, json!({ "ticker": "OLD", "symbol": "NEW" }));
        assert!(store.find_one(STATE_COLLECTION, NAME).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revert_leaves_untouched_assets_alone() {
        let store = MemoryStore::new();
        store
            .put("assets", "a1", json!({ "ticker": "VTI" }))
            .await
            .unwrap();
        store
            .put("assets", "a3", json!({ "symbol": "BND" }))
            .await
            .unwrap();

        RenameAssetTickerToSymbol.apply(&store).await.unwrap();
        RenameAssetTickerToSymbol.revert(&store).await.unwrap();

        assert_eq!(body(&store, "a1").await, json!({ "ticker": "VTI" }));
        assert_eq!(body(&store, "a3").await, json!({ "symbol": "BND" }));
    }
}
