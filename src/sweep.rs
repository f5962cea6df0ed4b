use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::database::Database;
use crate::decimal_time::{ratio_gte, ratio_lte};
use crate::types::{Bias, ConfluenceCtx, ConfluenceStateTag, Sweep, SwingKind, TimeFrame};

/// Compares live price to the active 4H swings and emits a bias signal (C6).
pub struct SweepDetector {
    db: Arc<Database>,
}

impl SweepDetector {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// §4.4: called on each live price tick (or 4H candle close). Expires
    /// stale sweeps, then checks whether the price just swept the active
    /// 4H high or low.
    pub async fn on_price(&self, price: Decimal) -> anyhow::Result<Option<Sweep>> {
        self.expire_stale().await?;

        let high = self.db.active_swing(TimeFrame::FourHour, SwingKind::High).await?;
        let low = self.db.active_swing(TimeFrame::FourHour, SwingKind::Low).await?;

        let high_swept = high
            .as_ref()
            .filter(|s| ratio_gte(price, s.price, dec!(1.001)))
            .map(|s| (s.id, s.price));
        let low_swept = low
            .as_ref()
            .filter(|s| ratio_lte(price, s.price, dec!(0.999)))
            .map(|s| (s.id, s.price));

        // Prefer whichever kind fires; both firing at once never happens
        // for a single price against two well-ordered swing levels.
        let new_sweep = if let Some((swing_ref, swing_price)) = high_swept {
            Some((SwingKind::High, swing_ref, swing_price))
        } else {
            low_swept.map(|(swing_ref, swing_price)| (SwingKind::Low, swing_ref, swing_price))
        };

        let Some((kind, swing_ref, _swing_price)) = new_sweep else {
            return Ok(None);
        };

        let active = self.db.active_sweep().await?;
        match active {
            None => Some(self.create_sweep(kind, swing_ref, price).await?),
            Some(existing) if existing.kind != kind => {
                self.expire_confluence(existing.id).await?;
                self.db.deactivate_sweep(existing.id).await?;
                info!("sweep {} superseded by opposite-kind sweep", existing.id);
                Some(self.create_sweep(kind, swing_ref, price).await?)
            }
            Some(_) => None, // same-kind sweep already active, nothing to do
        }
        .map_or(Ok(None), |s| Ok(Some(s)))
    }

    /// §4.4: a sweep superseded by an opposite-kind sweep takes its
    /// ConfluenceCtx down with it, regardless of how far that context had
    /// progressed.
    async fn expire_confluence(&self, sweep_ref: i64) -> anyhow::Result<()> {
        if let Some(mut ctx) = self.db.confluence_for_sweep(sweep_ref).await? {
            ctx.state = ConfluenceStateTag::Expired;
            self.db.update_confluence(ctx.id, &ctx).await?;
        }
        Ok(())
    }

    async fn create_sweep(&self, kind: SwingKind, swing_ref: i64, price: Decimal) -> anyhow::Result<Sweep> {
        let bias = Bias::from_swing_kind(kind);
        let sweep = self.db.insert_sweep(Utc::now(), kind, swing_ref, price, bias).await?;
        self.db.insert_confluence(&ConfluenceCtx::new(sweep.id)).await?;
        info!("new {:?} sweep at {} (bias {:?})", kind, price, bias);
        Ok(sweep)
    }

    /// §4.4: sweeps older than 24h are deactivated on each tick.
    async fn expire_stale(&self) -> anyhow::Result<()> {
        if let Some(active) = self.db.active_sweep().await? {
            if active.is_expired(Utc::now()) {
                self.db.deactivate_sweep(active.id).await?;
                info!("sweep {} expired (24h TTL)", active.id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_bullish_sweep_on_low_break() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.replace_active_swing(
            TimeFrame::FourHour,
            SwingKind::Low,
            Utc::now(),
            dec!(89000),
        )
        .await
        .unwrap();

        let detector = SweepDetector::new(db);
        let sweep = detector.on_price(dec!(88910)).await.unwrap();
        let sweep = sweep.expect("price below 89000*0.999 should sweep");
        assert_eq!(sweep.bias, Bias::Bullish);
        assert_eq!(sweep.kind, SwingKind::Low);
    }

    #[tokio::test]
    async fn no_sweep_when_price_inside_range() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.replace_active_swing(
            TimeFrame::FourHour,
            SwingKind::Low,
            Utc::now(),
            dec!(89000),
        )
        .await
        .unwrap();

        let detector = SweepDetector::new(db);
        let sweep = detector.on_price(dec!(89500)).await.unwrap();
        assert!(sweep.is_none());
    }
}
