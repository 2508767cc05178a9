//! Background fetch → render → publish cycle.
//!
//! One cycle runs every `interval`, forever. A cycle that fails at any stage
//! is logged and abandoned; the previously published artifact stays in place.
//! Each cycle runs as its own task so that a panic inside it is caught at the
//! join and the loop carries on with the next cycle.
use crate::artifact::{ArtifactStore, WriteError};
use crate::feed::{FeedRenderer, RenderError};
use crate::source::{BookSource, SourceError};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Fetching books failed: {0}")]
    Fetch(#[from] SourceError),
    #[error("Rendering feed failed: {0}")]
    Render(#[from] RenderError),
    #[error("Publishing feed failed: {0}")]
    Write(#[from] WriteError),
    #[error("Publish task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Books returned by the source.
    pub books: usize,
    /// Entries in the published document.
    pub entries: usize,
    /// Books dropped for an unparseable update time.
    pub skipped: usize,
}

pub struct RefreshLoop<S> {
    source: Arc<S>,
    renderer: Arc<FeedRenderer>,
    store: ArtifactStore,
    interval: Duration,
    created_at: DateTime<Utc>,
}

impl<S> Clone for RefreshLoop<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            renderer: Arc::clone(&self.renderer),
            store: self.store.clone(),
            interval: self.interval,
            created_at: self.created_at,
        }
    }
}

impl<S: BookSource> RefreshLoop<S> {
    /// `created_at` is the feed creation time; it is fixed for the lifetime
    /// of the loop.
    pub fn new(
        source: S,
        renderer: FeedRenderer,
        store: ArtifactStore,
        interval: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: Arc::new(source),
            renderer: Arc::new(renderer),
            store,
            interval,
            created_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Run cycles forever, sleeping `interval` after each one whatever its
    /// outcome.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            artifact = %self.store.path().display(),
            "Refresh loop started"
        );
        loop {
            self.run_supervised().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Run one cycle on its own task; errors and panics are logged, never
    /// propagated.
    pub async fn run_supervised(&self) -> Option<CycleReport> {
        let this = self.clone();
        match tokio::spawn(async move { this.run_cycle().await }).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Refresh cycle failed");
                None
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                tracing::error!(panic = %message, "Refresh cycle panicked, continuing");
                None
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "Refresh cycle was cancelled");
                None
            }
        }
    }

    /// One fetch → render → publish pass.
    pub async fn run_cycle(&self) -> Result<CycleReport, RefreshError> {
        let books = self.source.fetch_books().await?;
        let rendered = self.renderer.render(&books, self.created_at)?;
        let report = CycleReport {
            books: books.len(),
            entries: rendered.entries,
            skipped: rendered.skipped,
        };

        // write + fsync + rename block; keep them off the runtime workers
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.publish(&rendered.xml)).await??;

        tracing::info!(
            books = report.books,
            entries = report.entries,
            skipped = report.skipped,
            "Atom feed successfully updated"
        );

        Ok(report)
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Book;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source whose n-th call behaves as scripted; calls past the script
    /// repeat the last step.
    struct ScriptedSource {
        steps: Vec<Step>,
        calls: Arc<AtomicUsize>,
    }

    #[derive(Clone)]
    enum Step {
        Books(Vec<Book>),
        Fail,
        Panic,
    }

    impl BookSource for ScriptedSource {
        async fn fetch_books(&self) -> Result<Vec<Book>, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps[n.min(self.steps.len() - 1)].clone();
            match step {
                Step::Books(books) => Ok(books),
                Step::Fail => Err(SourceError::Timeout),
                Step::Panic => panic!("upstream exploded"),
            }
        }
    }

    fn book(enid: &str) -> Book {
        Book {
            title: format!("Title {enid}"),
            uptime: "2023-01-01 00:00:00".into(),
            enid: enid.into(),
            ..Book::default()
        }
    }

    fn refresh_loop(
        steps: Vec<Step>,
        dir: &tempfile::TempDir,
    ) -> (RefreshLoop<ScriptedSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            steps,
            calls: Arc::clone(&calls),
        };
        let refresh = RefreshLoop::new(
            source,
            FeedRenderer::default(),
            ArtifactStore::new(dir.path().join("dedao.atom")),
            Duration::from_secs(2 * 60 * 60),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        (refresh, calls)
    }

    #[tokio::test]
    async fn test_cycle_publishes_rendered_feed() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = book("bad");
        bad.uptime = "soon".into();
        let (refresh, _) = refresh_loop(vec![Step::Books(vec![book("a"), bad, book("b")])], &dir);

        let report = refresh.run_cycle().await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                books: 3,
                entries: 2,
                skipped: 1
            }
        );

        let xml = std::fs::read_to_string(dir.path().join("dedao.atom")).unwrap();
        assert!(xml.contains("Title a"));
        assert!(xml.contains("Title b"));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (refresh, _) = refresh_loop(vec![Step::Books(vec![book("a")]), Step::Fail], &dir);
        let path = dir.path().join("dedao.atom");

        refresh.run_cycle().await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = refresh.run_cycle().await.unwrap_err();
        assert!(matches!(err, RefreshError::Fetch(SourceError::Timeout)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_supervised_cycle_absorbs_panic() {
        let dir = tempfile::tempdir().unwrap();
        let (refresh, calls) =
            refresh_loop(vec![Step::Panic, Step::Books(vec![book("a")])], &dir);

        assert_eq!(refresh.run_supervised().await, None);
        assert!(!dir.path().join("dedao.atom").exists());

        let report = refresh.run_supervised().await.unwrap();
        assert_eq!(report.entries, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let refresh = RefreshLoop::new(
            ScriptedSource {
                steps: vec![Step::Books(vec![book("a")])],
                calls: Arc::new(AtomicUsize::new(0)),
            },
            FeedRenderer::default(),
            ArtifactStore::new(blocker.join("dedao.atom")),
            Duration::from_secs(60),
            Utc::now(),
        );

        assert!(matches!(
            refresh.run_cycle().await,
            Err(RefreshError::Write(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_fixed_interval_through_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (refresh, calls) = refresh_loop(
            vec![Step::Panic, Step::Fail, Step::Books(vec![book("a")])],
            &dir,
        );

        // Cycles at 0h, 2h and 4h; the 5h deadline lands during the third sleep.
        let deadline = Duration::from_secs(5 * 60 * 60);
        assert!(tokio::time::timeout(deadline, refresh.run()).await.is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(dir.path().join("dedao.atom").exists());
    }

    #[test]
    fn test_panic_message_extracts_text() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic payload");
    }
}
