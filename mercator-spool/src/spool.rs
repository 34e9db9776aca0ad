//! The generic spool wrapper shared by every backing store.

use mercator_common::{Signal, internal};

use crate::{
    backends::{FileBackingStore, MemoryBackingStore, TestBackingStore},
    r#trait::BackingStore,
};

/// Wraps a [`BackingStore`] with lifecycle management: one-time setup via
/// `init` and, for stores that need it, a background task driven by `serve`.
#[derive(Debug, Clone)]
pub struct Spool<B: BackingStore> {
    store: B,
}

impl<B: BackingStore> Spool<B> {
    pub const fn new(store: B) -> Self {
        Self { store }
    }

    /// Access the underlying backing store directly (e.g. to hand an `Arc<dyn
    /// BackingStore>` to the SMTP and delivery crates).
    pub const fn store(&self) -> &B {
        &self.store
    }
}

impl Spool<FileBackingStore> {
    /// Ensures the queue directory (and its class subdirectories) exist and are
    /// writable before the spool is served.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or validated.
    pub fn init(&mut self) -> crate::Result<()> {
        self.store.ensure_layout()
    }

    /// Watches the queue root for externally-dropped files until `shutdown`
    /// fires. Message promotion and delivery scheduling live in
    /// `mercator-delivery`; this loop only keeps the on-disk layout sane
    /// (logging unexpected entries) for as long as the process runs.
    ///
    /// # Errors
    /// Returns an error if the filesystem watcher cannot be installed.
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> crate::Result<()> {
        use notify::Watcher;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = tx.send(event);
        })
        .map_err(|err| crate::SpoolError::WatchError(err.to_string()))?;

        watcher
            .watch(self.store.path(), notify::RecursiveMode::Recursive)
            .map_err(|err| crate::SpoolError::WatchError(err.to_string()))?;

        internal!("Serving file spool at {}", self.store.path().display());

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown)) {
                        internal!(level = INFO, "File spool received shutdown signal");
                        break;
                    }
                }

                event = rx.recv() => {
                    match event {
                        Some(Ok(event)) => internal!(level = TRACE, "Spool directory event: {:?}", event),
                        Some(Err(err)) => internal!(level = WARN, "Spool watcher error: {err}"),
                        None => break,
                    }
                }
            }
        }

        Ok(())
    }
}

/// A spool backed by the filesystem, used in production.
pub type FileSpool = Spool<FileBackingStore>;
/// A spool backed by an in-memory map, used for short-lived or test deployments.
pub type MemorySpool = Spool<MemoryBackingStore>;
/// A spool backed by [`TestBackingStore`], adding wait/notify hooks for tests.
pub type TestSpool = Spool<TestBackingStore>;
