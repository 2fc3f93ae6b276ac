//! CLI subcommands.

use tokio_util::sync::CancellationToken;

#[expect(
    unreachable_pub,
    reason = "binary crate — pub inside private module is fine"
)]
pub mod keygen;
#[expect(
    unreachable_pub,
    reason = "binary crate — pub inside private module is fine"
)]
pub mod sign;
#[expect(
    unreachable_pub,
    reason = "binary crate — pub inside private module is fine"
)]
pub mod tag;
#[expect(
    unreachable_pub,
    reason = "binary crate — pub inside private module is fine"
)]
pub mod verify;

/// A token that fires on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}
