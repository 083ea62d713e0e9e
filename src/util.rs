use tokio::sync::broadcast;

/// Process wide shutdown signal. Every clone gets its own receiver.
#[derive(Debug)]
pub struct Shutdown(broadcast::Sender<()>, broadcast::Receiver<()>);

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = broadcast::channel(1);
        Shutdown(tx, rx)
    }

    pub fn shutdown(&self) {
        // no receivers left means everything has already stopped
        let _ = self.0.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.0.subscribe()
    }

    pub async fn wait(&mut self) {
        let _ = self.1.recv().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Shutdown(self.0.clone(), self.0.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::Shutdown;

    #[tokio::test]
    async fn clones_observe_shutdown() {
        let shutdown = Shutdown::new();
        let mut clone = shutdown.clone();
        let mut rx = shutdown.subscribe();
        shutdown.shutdown();
        clone.wait().await;
        assert!(rx.recv().await.is_ok());
    }
}
