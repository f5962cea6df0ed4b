use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use tracing::info;

use crate::database::Database;
use crate::decimal_time::ratio_gte;
use crate::types::{Bias, BosRecord, ChochRecord, Candle, ConfluenceCtx, ConfluenceStateTag, FvgRecord, Sweep};

const CHOCH_LOOKBACK: usize = 5;

/// Signal emitted when a confluence context reaches COMPLETE; consumed by
/// the stop-loss calculator → sizer → gatekeeper → oracle pipeline.
#[derive(Debug, Clone)]
pub struct ConfluenceSignal {
    pub sweep: Sweep,
    pub ctx: ConfluenceCtx,
}

/// CHoCH → FVG-fill → BOS state machine with a 12h timeout (C7). Transitions
/// are expressed as a pure `step` function per candle batch, matching the
/// tagged-variant-plus-effects shape laid out for this component: easy to
/// property-test, no I/O inside the transition logic itself.
pub struct ConfluenceEngine {
    db: Arc<Database>,
}

impl ConfluenceEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Applies one batch of newly-closed 5M candles against the active
    /// sweep's confluence context, persists the result, and returns a
    /// signal if the context just completed.
    pub async fn advance(&self, candles: &[Candle]) -> anyhow::Result<Option<ConfluenceSignal>> {
        let Some(sweep) = self.db.active_sweep().await? else {
            return Ok(None);
        };
        let Some(mut ctx) = self.db.confluence_for_sweep(sweep.id).await? else {
            return Ok(None);
        };
        if ctx.is_terminal() {
            return Ok(None);
        }

        let now = candles.last().map(|c| c.ts_start).unwrap_or_else(Utc::now);
        if now - sweep.ts > chrono::Duration::hours(12) {
            ctx.state = ConfluenceStateTag::Expired;
            self.db.update_confluence(ctx.id, &ctx).await?;
            self.db.deactivate_sweep(sweep.id).await?;
            info!("confluence {} expired (12h TTL)", ctx.id);
            return Ok(None);
        }

        let prior_state = ctx.state;
        step(&mut ctx, sweep.bias, candles);

        if ctx.state != prior_state {
            self.db.update_confluence(ctx.id, &ctx).await?;
        }

        if ctx.state == ConfluenceStateTag::Complete && prior_state != ConfluenceStateTag::Complete {
            info!("confluence {} COMPLETE, bias {:?}", ctx.id, sweep.bias);
            self.db.deactivate_sweep(sweep.id).await?;
            return Ok(Some(ConfluenceSignal { sweep, ctx }));
        }

        Ok(None)
    }
}

/// Pure state transition (§4.5, §9 design note). `candles` are the closed 5M
/// candles available so far for this sweep, ascending by time. Mutates
/// `ctx` in place; never performs I/O or side effects.
fn step(ctx: &mut ConfluenceCtx, bias: Bias, candles: &[Candle]) {
    match ctx.state {
        ConfluenceStateTag::WaitingChoch => {
            if let Some(choch) = find_choch(candles, bias) {
                ctx.choch = Some(choch);
                ctx.state = ConfluenceStateTag::WaitingFvg;
            }
        }
        ConfluenceStateTag::WaitingFvg => {
            let choch = ctx.choch.expect("WAITING_FVG implies a recorded CHoCH");
            if ctx.fvg.is_none() {
                if let Some(fvg) = find_fvg(candles, bias, choch.ts) {
                    ctx.fvg = Some(fvg);
                }
            }
            if let Some(fvg) = ctx.fvg {
                if fvg.fill_ts.is_none() {
                    if let Some(fill_ts) = find_fill(candles, bias, fvg) {
                        ctx.fvg = Some(FvgRecord { fill_ts: Some(fill_ts), ..fvg });
                        ctx.state = ConfluenceStateTag::WaitingBos;
                    }
                }
            }
        }
        ConfluenceStateTag::WaitingBos => {
            let choch = ctx.choch.expect("WAITING_BOS implies a recorded CHoCH");
            let fvg = ctx.fvg.expect("WAITING_BOS implies a recorded FVG");
            let fill_ts = fvg.fill_ts.expect("WAITING_BOS implies the FVG has filled");
            if let Some(bos) = find_bos(candles, bias, choch.price, fill_ts) {
                ctx.bos = Some(bos);
                ctx.state = ConfluenceStateTag::Complete;
            }
        }
        ConfluenceStateTag::Complete | ConfluenceStateTag::Expired => {}
    }
}

/// §4.5 WAITING_CHOCH: a CHoCH fires on candle `c` when `c.close` breaks the
/// max/min of the previous 5 closed candles by the 0.1% ratio. Picks the
/// earliest qualifying candle (tie-break rule).
fn find_choch(candles: &[Candle], bias: Bias) -> Option<ChochRecord> {
    if candles.len() < CHOCH_LOOKBACK + 1 {
        return None;
    }
    for i in CHOCH_LOOKBACK..candles.len() {
        let window = &candles[i - CHOCH_LOOKBACK..i];
        let c = &candles[i];
        let fires = match bias {
            Bias::Bullish => {
                let max_prev = window.iter().map(|w| w.high).max().unwrap();
                ratio_gte(c.close, max_prev, dec!(1.001))
            }
            Bias::Bearish => {
                let min_prev = window.iter().map(|w| w.low).min().unwrap();
                c.close <= min_prev * dec!(0.999)
            }
        };
        if fires {
            return Some(ChochRecord { ts: c.ts_start, price: c.close });
        }
    }
    None
}

/// §4.5 WAITING_FVG: scans triples `(c1, c2, c3)` with `c3.ts > choch.ts`.
/// Picks the earliest qualifying triple.
fn find_fvg(candles: &[Candle], bias: Bias, choch_ts: DateTime<Utc>) -> Option<FvgRecord> {
    if candles.len() < 3 {
        return None;
    }
    for window in candles.windows(3) {
        let (c1, _c2, c3) = (&window[0], &window[1], &window[2]);
        if c3.ts_start <= choch_ts {
            continue;
        }
        let gap = match bias {
            Bias::Bullish if c3.low > c1.high => {
                let ratio = (c3.low - c1.high) / c3.low;
                (ratio >= dec!(0.001)).then_some((c1.high, c3.low))
            }
            Bias::Bearish if c1.low > c3.high => {
                let ratio = (c1.low - c3.high) / c1.low;
                (ratio >= dec!(0.001)).then_some((c3.high, c1.low))
            }
            _ => None,
        };
        if let Some((lo, hi)) = gap {
            return Some(FvgRecord { ts: c3.ts_start, lo, hi, fill_ts: None });
        }
    }
    None
}

/// §4.5: fill occurs on the first candle after the FVG formed whose wick
/// retraces into the gap.
fn find_fill(candles: &[Candle], bias: Bias, fvg: FvgRecord) -> Option<DateTime<Utc>> {
    candles
        .iter()
        .filter(|c| c.ts_start > fvg.ts)
        .find(|c| match bias {
            Bias::Bullish => c.low <= fvg.lo,
            Bias::Bearish => c.high >= fvg.hi,
        })
        .map(|c| c.ts_start)
}

/// §4.5 WAITING_BOS: BOS fires on a candle after the fill when close breaks
/// the CHoCH price by the 0.1% ratio, in the sweep's direction.
fn find_bos(
    candles: &[Candle],
    bias: Bias,
    choch_price: rust_decimal::Decimal,
    fill_ts: DateTime<Utc>,
) -> Option<BosRecord> {
    candles
        .iter()
        .filter(|c| c.ts_start > fill_ts)
        .find(|c| match bias {
            Bias::Bullish => ratio_gte(c.close, choch_price, dec!(1.001)),
            Bias::Bearish => c.close <= choch_price * dec!(0.999),
        })
        .map(|c| BosRecord { ts: c.ts_start, price: c.close })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle_at(minute_offset: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        use rust_decimal::Decimal;
        Candle {
            timeframe: crate::types::TimeFrame::FiveMinute,
            ts_start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(minute_offset * 5),
            open: Decimal::try_from(open).unwrap(),
            high: Decimal::try_from(high).unwrap(),
            low: Decimal::try_from(low).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: dec!(10),
        }
    }

    #[test]
    fn full_happy_path_reaches_complete() {
        // Mirrors scenario S1's shape: CHoCH at 90600 after a flat lookback
        // around 90000, FVG gap 90200 -> 90500, fill at 90150, BOS at 90692.
        let candles = vec![
            candle_at(0, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(1, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(2, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(3, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(4, 90000.0, 90060.0, 89950.0, 90000.0),
            candle_at(5, 90000.0, 90600.0, 89950.0, 90600.0), // CHoCH: close > 90090*1.001
            candle_at(6, 90600.0, 90200.0, 90100.0, 90150.0), // c1, high=90200
            candle_at(7, 90150.0, 90300.0, 90100.0, 90250.0), // c2 impulse
            candle_at(8, 90250.0, 90550.0, 90500.0, 90520.0), // c3, low=90500 > c1.high
            candle_at(9, 90520.0, 90550.0, 90150.0, 90200.0), // fill candle, low=90150 <= 90200
            candle_at(10, 90200.0, 90700.0, 90180.0, 90692.0), // BOS: close 90692 > 90600*1.001
        ];

        let mut ctx = ConfluenceCtx::new(1);
        step(&mut ctx, Bias::Bullish, &candles);
        assert_eq!(ctx.state, ConfluenceStateTag::WaitingFvg);
        step(&mut ctx, Bias::Bullish, &candles);
        assert_eq!(ctx.state, ConfluenceStateTag::WaitingBos);
        step(&mut ctx, Bias::Bullish, &candles);
        assert_eq!(ctx.state, ConfluenceStateTag::Complete);
    }

    #[test]
    fn state_never_regresses_across_repeated_steps() {
        let candles = vec![
            candle_at(0, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(1, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(2, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(3, 90000.0, 90050.0, 89950.0, 90000.0),
            candle_at(4, 90000.0, 90060.0, 89950.0, 90000.0),
            candle_at(5, 90000.0, 90600.0, 89950.0, 90600.0),
        ];
        let mut ctx = ConfluenceCtx::new(1);
        step(&mut ctx, Bias::Bullish, &candles);
        let after_first = ctx.state;
        step(&mut ctx, Bias::Bullish, &candles);
        assert_eq!(ctx.state, after_first); // no new data, no regression, no bogus advance
    }
}
