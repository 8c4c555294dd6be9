//! Counting `tracing` events emitted while a closure runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// A `tracing-subscriber` layer that counts warnings and errors.
///
/// Only events emitted on the thread running [`capture`](Self::capture) are seen.
#[derive(Clone, Default)]
pub struct LogCounter {
    errors: Arc<AtomicUsize>,
    warnings: Arc<AtomicUsize>,
}

impl LogCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.errors.store(0, Ordering::SeqCst);
        self.warnings.store(0, Ordering::SeqCst);
    }

    /// Run `f` with this counter installed as the thread's default subscriber.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl<S: Subscriber> Layer<S> for LogCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::ERROR => {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            Level::WARN => {
                self.warnings.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_only_inside_capture() {
        let counter = LogCounter::new();
        counter.capture(|| {
            tracing::error!("one");
            tracing::warn!("two");
            tracing::info!("ignored");
        });
        tracing::error!("outside");

        assert_eq!(counter.errors(), 1);
        assert_eq!(counter.warnings(), 1);
        counter.reset();
        assert_eq!(counter.errors(), 0);
    }
}
