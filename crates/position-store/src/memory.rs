//! DashMap-backed position store.

use crate::{PositionFilter, PositionPatch, PositionStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use model::{Position, PositionKind};

/// Position store held in process memory.
///
/// Writes to one id are serialized by the map's entry lock. No operation
/// holds two entry guards at once.
#[derive(Debug, Default)]
pub struct InMemoryPositionStore {
    positions: DashMap<String, Position>,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Copy of every record, ordered by id.
    pub fn snapshot(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self.positions.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn upsert(&self, position: Position) -> Result<(), StoreError> {
        self.positions.insert(position.id.clone(), position);
        Ok(())
    }

    async fn update(&self, id: &str, patch: PositionPatch) -> Result<Position, StoreError> {
        let mut entry = self
            .positions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(entry.value_mut());
        Ok(entry.value().clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Position>, StoreError> {
        Ok(self.positions.get(id).map(|e| e.value().clone()))
    }

    async fn query(&self, filter: &PositionFilter) -> Result<Vec<Position>, StoreError> {
        let mut matched: Vec<Position> = self
            .positions
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.positions.remove(id);
        Ok(())
    }

    async fn merge_averaging(
        &self,
        anchor_id: &str,
        averaging_id: &str,
    ) -> Result<Position, StoreError> {
        let averaging = self
            .positions
            .get(averaging_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(averaging_id.to_string()))?;

        if averaging.kind != PositionKind::Averaging
            || averaging.depends_on.as_deref() != Some(anchor_id)
            || !averaging.filled
        {
            return Err(StoreError::Invalid {
                id: averaging_id.to_string(),
                reason: format!("not a filled averaging record of {anchor_id}"),
            });
        }

        let merged = {
            let mut anchor = self
                .positions
                .get_mut(anchor_id)
                .ok_or_else(|| StoreError::NotFound(anchor_id.to_string()))?;
            let merged = anchor.value().merged_with(&averaging);
            *anchor.value_mut() = merged.clone();
            merged
        };

        self.positions.remove(averaging_id);

        tracing::debug!(
            anchor_id = %anchor_id,
            averaging_id = %averaging_id,
            avg_price = %merged.avg_price,
            cum_exec_qty = %merged.cum_exec_qty,
            "Averaging merged into anchor"
        );

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use model::{InstrumentClass, Side, Venue};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn record(id: &str, kind: PositionKind, minutes_ago: i64) -> Position {
        Position::submitted(
            id.into(),
            7,
            kind,
            Venue::Demo,
            InstrumentClass::Spot,
            "SOLUSDT".into(),
            Side::Buy,
            dec!(1),
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    fn fill(p: &mut Position, avg: Decimal, qty: Decimal) {
        p.avg_price = avg;
        p.cum_exec_qty = qty;
        p.cum_exec_value = avg * qty;
        p.filled = true;
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let store = InMemoryPositionStore::new();
        store.upsert(record("a", PositionKind::Main, 0)).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_none());

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_patch() {
        let store = InMemoryPositionStore::new();
        store.upsert(record("a", PositionKind::Main, 0)).await.unwrap();

        let updated = store
            .update("a", PositionPatch::fill(dec!(10), dec!(2), dec!(20), dec!(0.002)))
            .await
            .unwrap();
        assert!(updated.filled);
        assert_eq!(updated.cum_exec_value, dec!(20));

        let missing = store.update("nope", PositionPatch::finished()).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_finished_is_terminal_but_tp_can_be_cleared() {
        let store = InMemoryPositionStore::new();
        store.upsert(record("a", PositionKind::Main, 0)).await.unwrap();
        store.update("a", PositionPatch::tp_opened(dec!(5))).await.unwrap();
        store.update("a", PositionPatch::finished()).await.unwrap();

        let patch = PositionPatch {
            finished: Some(false),
            ..PositionPatch::tp_cleared()
        };
        let p = store.update("a", patch).await.unwrap();
        assert!(!p.tp_opened);
        assert!(p.finished);
        assert_eq!(p.trigger_price, Some(dec!(5)));
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = InMemoryPositionStore::new();
        store.upsert(record("new", PositionKind::Main, 1)).await.unwrap();
        store.upsert(record("old", PositionKind::Main, 10)).await.unwrap();
        store
            .upsert(record("child", PositionKind::Tp, 5).depending_on("old"))
            .await
            .unwrap();

        let mains = store
            .query(&PositionFilter::open().kind(PositionKind::Main).owner(7))
            .await
            .unwrap();
        let ids: Vec<&str> = mains.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);

        let children = store
            .query(&PositionFilter::new().depends_on("old"))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);

        let none = store
            .query(&PositionFilter::new().venue(Venue::Real))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_merge_averaging() {
        let store = InMemoryPositionStore::new();
        let mut anchor = record("anchor", PositionKind::Main, 10);
        fill(&mut anchor, dec!(100), dec!(10));
        let mut averaging = record("avg", PositionKind::Averaging, 1).depending_on("anchor");
        fill(&mut averaging, dec!(90), dec!(5));
        store.upsert(anchor).await.unwrap();
        store.upsert(averaging).await.unwrap();

        let merged = store.merge_averaging("anchor", "avg").await.unwrap();

        assert_eq!(merged.cum_exec_qty, dec!(15));
        assert_eq!(merged.avg_price.round_dp(2), dec!(96.67));
        assert!(store.get("avg").await.unwrap().is_none());
        assert_eq!(store.get("anchor").await.unwrap().unwrap(), merged);

        // A second merge has nothing left to fold in.
        assert!(matches!(
            store.merge_averaging("anchor", "avg").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_rejects_unfilled_or_foreign() {
        let store = InMemoryPositionStore::new();
        let mut anchor = record("anchor", PositionKind::Main, 10);
        fill(&mut anchor, dec!(100), dec!(10));
        store.upsert(anchor).await.unwrap();
        store
            .upsert(record("pending", PositionKind::Averaging, 1).depending_on("anchor"))
            .await
            .unwrap();
        let mut foreign = record("foreign", PositionKind::Averaging, 1).depending_on("other");
        fill(&mut foreign, dec!(90), dec!(1));
        store.upsert(foreign).await.unwrap();

        assert!(matches!(
            store.merge_averaging("anchor", "pending").await,
            Err(StoreError::Invalid { .. })
        ));
        assert!(matches!(
            store.merge_averaging("anchor", "foreign").await,
            Err(StoreError::Invalid { .. })
        ));
        assert_eq!(store.len(), 3);
    }
}
