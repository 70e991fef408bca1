//! Reverse scanner: target → base
//!
//! Finds target records with no base counterpart. Only ids are read from
//! the target; each page is resolved against the base with one id-set
//! lookup. This scanner never tails: a short page ends it.

use super::{ScanContext, ScanDirection, ScanStats, ValidateError};
use crate::entity::Entity;
use crate::store::StoreError;
use migrator_common::events::InconsistentKind;
use std::collections::HashSet;
use tracing::debug;

pub(crate) async fn scan<T: Entity>(ctx: &ScanContext<T>) -> Result<ScanStats, ValidateError> {
    let mut stats = ScanStats::default();
    let limit = ctx.config.batch_size;
    let mut offset: u64 = 0;

    loop {
        let ids = match ctx.bounded(ctx.target.find_ids(offset, limit)).await {
            Ok(ids) => ids,
            Err(e) if e.is_interrupt() => {
                debug!(offset, error = %e, "Reverse scan stopped");
                return Ok(stats);
            }
            // A failed read yields no page, which ends the scan
            Err(e) => {
                ctx.skip_or_abort(ScanDirection::Reverse, "read target ids", e, &mut stats)?;
                return Ok(stats);
            }
        };

        if !ids.is_empty() {
            stats.visited += ids.len() as u64;
            report_missing_in_base(ctx, &ids, &mut stats).await?;
        }

        if ids.len() < limit {
            debug!(offset, "Target store exhausted");
            return Ok(stats);
        }
        offset += limit as u64;
    }
}

async fn report_missing_in_base<T: Entity>(
    ctx: &ScanContext<T>,
    ids: &[i64],
    stats: &mut ScanStats,
) -> Result<(), ValidateError> {
    let found = match ctx.bounded(ctx.base.find_existing_ids(ids)).await {
        Ok(found) => found,
        Err(StoreError::Cancelled) => return Ok(()),
        Err(e) => return ctx.skip_or_abort(ScanDirection::Reverse, "read base ids", e, stats),
    };

    let found: HashSet<i64> = found.into_iter().collect();
    for &id in ids.iter().filter(|id| !found.contains(*id)) {
        ctx.report(id, InconsistentKind::BaseMissing, stats).await;
    }
    Ok(())
}
