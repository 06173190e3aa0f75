use tokio::sync::watch;

/// Installs the process signal handler and hands out awaitable tokens.
pub struct ShutdownHandler {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandler {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Spawns the ctrl-c listener and returns a cloneable token that
    /// resolves once shutdown has been requested.
    pub fn install(self) -> ShutdownToken {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                let _ = tx.send(true);
            }
        });
        ShutdownToken {
            tx: self.tx,
            rx: self.rx,
        }
    }
}

#[derive(Clone)]
pub struct ShutdownToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        let _ = self.rx.changed().await;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Requests shutdown programmatically, e.g. on a fatal capture error.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}
