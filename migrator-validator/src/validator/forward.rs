//! Forward scanner: base → target
//!
//! Finds records whose target copy is missing or differs. Two
//! interchangeable strategies walk the base store ordered by id:
//! row-by-row (one lookup per row) and batched (one id-set lookup per page).
//! Only this scanner tails: with a poll interval it keeps re-reading the
//! offset where data ran out.

use super::{ForwardStrategy, ScanContext, ScanDirection, ScanStats, ValidateError};
use crate::entity::Entity;
use crate::store::StoreError;
use migrator_common::events::InconsistentKind;
use std::collections::HashMap;
use tracing::debug;

pub(crate) async fn scan<T: Entity>(ctx: &ScanContext<T>) -> Result<ScanStats, ValidateError> {
    match ctx.config.forward_strategy {
        ForwardStrategy::RowByRow => scan_rows(ctx).await,
        ForwardStrategy::Batched => scan_batches(ctx).await,
    }
}

/// Row-by-row strategy
///
/// The offset advances by one after each comparison or skipped error and
/// never while waiting on a not-found offset, so rows appended later at
/// that offset are still seen.
async fn scan_rows<T: Entity>(ctx: &ScanContext<T>) -> Result<ScanStats, ValidateError> {
    let mut stats = ScanStats::default();
    let mut offset: u64 = 0;

    loop {
        let read = ctx
            .bounded(ctx.base.find_at_offset(offset, ctx.config.watermark))
            .await;
        match read {
            Ok(None) => {
                if !ctx.config.is_tailing() {
                    debug!(offset, "Base store exhausted");
                    return Ok(stats);
                }
                if !ctx.pause().await {
                    return Ok(stats);
                }
                continue;
            }
            Ok(Some(src)) => {
                stats.visited += 1;
                compare_row(ctx, &src, &mut stats).await?;
            }
            Err(e) if e.is_interrupt() => {
                debug!(offset, error = %e, "Forward scan stopped");
                return Ok(stats);
            }
            Err(e) => ctx.skip_or_abort(ScanDirection::Forward, "read base row", e, &mut stats)?,
        }
        offset += 1;
    }
}

async fn compare_row<T: Entity>(
    ctx: &ScanContext<T>,
    src: &T,
    stats: &mut ScanStats,
) -> Result<(), ValidateError> {
    let id = src.id();
    match ctx.bounded(ctx.target.find_by_id(id)).await {
        Ok(None) => ctx.report(id, InconsistentKind::TargetMissing, stats).await,
        Ok(Some(dst)) => {
            if !src.equals(&dst) {
                ctx.report(id, InconsistentKind::NotEqual, stats).await;
            }
        }
        // The next base read observes the cancellation and ends the scan
        Err(StoreError::Cancelled) => {}
        Err(e) => ctx.skip_or_abort(ScanDirection::Forward, "read target row", e, stats)?,
    }
    Ok(())
}

/// Batched strategy
///
/// A failed page read ends the scan; a failed target lookup skips the page.
async fn scan_batches<T: Entity>(ctx: &ScanContext<T>) -> Result<ScanStats, ValidateError> {
    let mut stats = ScanStats::default();
    let limit = ctx.config.batch_size;
    let mut offset: u64 = 0;

    loop {
        let read = ctx
            .bounded(ctx.base.find_page(offset, limit, ctx.config.watermark))
            .await;
        let srcs = match read {
            Ok(srcs) => srcs,
            Err(e) if e.is_interrupt() => {
                debug!(offset, error = %e, "Forward scan stopped");
                return Ok(stats);
            }
            Err(e) => {
                ctx.skip_or_abort(ScanDirection::Forward, "read base page", e, &mut stats)?;
                return Ok(stats);
            }
        };

        if srcs.is_empty() {
            if !ctx.config.is_tailing() {
                debug!(offset, "Base store exhausted");
                return Ok(stats);
            }
            if !ctx.pause().await {
                return Ok(stats);
            }
            continue;
        }

        stats.visited += srcs.len() as u64;
        compare_page(ctx, &srcs, &mut stats).await?;

        offset += srcs.len() as u64;
        if srcs.len() < limit && !ctx.config.is_tailing() {
            return Ok(stats);
        }
    }
}

async fn compare_page<T: Entity>(
    ctx: &ScanContext<T>,
    srcs: &[T],
    stats: &mut ScanStats,
) -> Result<(), ValidateError> {
    let ids: Vec<i64> = srcs.iter().map(Entity::id).collect();
    let dsts = match ctx.bounded(ctx.target.find_by_ids(&ids)).await {
        Ok(dsts) => dsts,
        Err(StoreError::Cancelled) => return Ok(()),
        Err(e) => return ctx.skip_or_abort(ScanDirection::Forward, "read target page", e, stats),
    };

    let dsts: HashMap<i64, T> = dsts.into_iter().map(|dst| (dst.id(), dst)).collect();
    for src in srcs {
        match dsts.get(&src.id()) {
            None => ctx.report(src.id(), InconsistentKind::TargetMissing, stats).await,
            Some(dst) if !src.equals(dst) => {
                ctx.report(src.id(), InconsistentKind::NotEqual, stats).await
            }
            Some(_) => {}
        }
    }
    Ok(())
}
