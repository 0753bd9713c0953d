use tokio_util::sync::CancellationToken;
use tracing::warn;

static CANCEL: tokio::sync::OnceCell<CancellationToken> = tokio::sync::OnceCell::const_new();

pub struct Quit(CancellationToken);

impl Quit {
    /// Returns when the program has been asked to quit by the OS.
    pub async fn quit(&self) {
        self.0.cancelled().await
    }
}

/// Start watching for quit signals, if not already doing so.
pub async fn quit_watch() -> Quit {
    let cancel = CANCEL
        .get_or_init(|| async move {
            let cancel = CancellationToken::new();
            #[cfg(unix)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                for kind in [
                    SignalKind::interrupt(),
                    SignalKind::terminate(),
                    SignalKind::hangup(),
                    SignalKind::pipe(),
                    SignalKind::quit(),
                ] {
                    let mut sig = match signal(kind) {
                        Ok(sig) => sig,
                        Err(e) => {
                            warn!("Couldn't watch for signal {:?}: {}", kind, e);
                            continue;
                        }
                    };
                    let cancel_tx = cancel.clone();
                    tokio::spawn(async move {
                        sig.recv().await;
                        cancel_tx.cancel();
                    });
                }
            }
            #[cfg(windows)]
            {
                // ctrl-c
                let cancel_tx = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel_tx.cancel();
                    }
                });

                // ctrl-close
                let cancel_tx = cancel.clone();
                tokio::spawn(async move {
                    if let Ok(mut sig) = tokio::signal::windows::ctrl_close() {
                        sig.recv().await;
                        cancel_tx.cancel();
                    }
                });
            }
            cancel
        })
        .await;

    Quit(cancel.clone())
}
