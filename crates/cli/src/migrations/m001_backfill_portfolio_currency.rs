//! Portfolios created before multi-currency support have no `currency`.

use async_trait::async_trait;
use folio_migrations::{DataStore, Migration};
use serde_json::{json, Value};

use super::{object_mut, STATE_COLLECTION};

const NAME: &str = "001_backfill_portfolio_currency";
const DEFAULT_CURRENCY: &str = "USD";

/// Sets `currency: "USD"` on every portfolio missing one
pub struct BackfillPortfolioCurrency;

#[async_trait]
impl Migration for BackfillPortfolioCurrency {
    fn name(&self) -> &str {
        NAME
    }

    async fn apply(&self, store: &dyn DataStore) -> anyhow::Result<()> {
        let mut backfilled = Vec::new();

        for mut doc in store.find_all("portfolios").await? {
            let portfolio = object_mut("portfolios", &doc.key, &mut doc.body)?;
            if portfolio.get("currency").map_or(true, Value::is_null) {
                portfolio.insert("currency".to_string(), json!(DEFAULT_CURRENCY));
                store.put("portfolios", &doc.key, doc.body).await?;
                backfilled.push(doc.key);
            }
        }

        tracing::info!(count = backfilled.len(), "Backfilled portfolio currency");
        store
            .put(STATE_COLLECTION, NAME, json!({ "portfolios": backfilled }))
            .await?;
        Ok(())
    }

    fn is_reversible(&self) -> bool {
        true
    }

    /// Removes the currency only from portfolios this migration touched
    async fn revert(&self, store: &dyn DataStore) -> anyhow::Result<()> {
        let state = store
            .find_one(STATE_COLLECTION, NAME)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no record of which portfolios were backfilled"))?;

        let keys: Vec<String> = serde_json::from_value(state.body["portfolios"].clone())?;
        for key in keys {
            if let Some(mut doc) = store.find_one("portfolios", &key).await? {
                object_mut("portfolios", &key, &mut doc.body)?.remove("currency");
                store.put("portfolios", &key, doc.body).await?;
            }
        }

        store.delete(STATE_COLLECTION, NAME).await?;
        Ok(())
    }
}
