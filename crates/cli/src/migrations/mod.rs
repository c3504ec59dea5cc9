//! Registered data migrations for the portfolio store
//!
//! Add new migrations here with the next sequence number. Never rename or
//! reorder an entry once it has shipped; the name is the ledger key.

mod m001_backfill_portfolio_currency;
mod m002_rename_asset_ticker_to_symbol;
mod m003_normalize_transaction_types;

use folio_migrations::Manifest;
use serde_json::{Map, Value};

pub use m001_backfill_portfolio_currency::BackfillPortfolioCurrency;
pub use m002_rename_asset_ticker_to_symbol::RenameAssetTickerToSymbol;
pub use m003_normalize_transaction_types::NormalizeTransactionTypes;

/// Collection where migrations keep bookkeeping needed by their revert step
pub(crate) const STATE_COLLECTION: &str = "migration_state";

/// Every migration the application knows about
pub fn manifest() -> Manifest {
    Manifest::new()
        .register(BackfillPortfolioCurrency)
        .register(RenameAssetTickerToSymbol)
        .register(NormalizeTransactionTypes)
}

/// Mutable object view of a document body
pub(crate) fn object_mut<'a>(
    collection: &str,
    key: &str,
    body: &'a mut Value,
) -> anyhow::Result<&'a mut Map<String, Value>> {
    body.as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("{}/{} is not a JSON object", collection, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_migrations::MigrationSource;

    #[test]
    fn test_manifest_is_valid_and_ordered() {
        let names: Vec<String> = manifest()
            .list()
            .unwrap()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "001_backfill_portfolio_currency",
                "002_rename_asset_ticker_to_symbol",
                "003_normalize_transaction_types",
            ]
        );
    }

    #[test]
    fn test_object_mut_rejects_scalars() {
        let mut body = Value::from(3);
        assert!(object_mut("assets", "a1", &mut body).is_err());
    }
}
