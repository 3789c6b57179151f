/// Background task implementations
use crate::{context::AppContext, error::PatrolResult};

/// Purge expired, unconsumed binding codes
pub async fn purge_expired_codes(ctx: &AppContext) -> PatrolResult<u64> {
    ctx.code_issuer.purge_expired().await
}
