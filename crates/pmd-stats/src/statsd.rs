use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{trace, warn};

use crate::{Aggregator, Snapshot};

/// Receives every flushed snapshot.
pub type FlushHandler = Arc<dyn Fn(&Snapshot) + Send + Sync>;

enum Op {
    Feed(String),
    Stop,
}

/// One aggregator running on its own task.
///
/// Feeding never blocks. Malformed or inconsistent samples are logged and dropped.
pub struct Statsd {
    tx: mpsc::UnboundedSender<Op>,
    task: JoinHandle<()>,
}

impl Statsd {
    /// Starts the aggregation task; snapshots are flushed every `interval`.
    pub fn spawn(prefix: impl Into<String>, interval: Duration, on_flush: FlushHandler) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let agg = Aggregator::new(prefix, interval);
        let task = tokio::spawn(run(agg, rx, on_flush));
        Self { tx, task }
    }

    pub fn feed(&self, line: impl Into<String>) {
        let _ = self.tx.send(Op::Feed(line.into()));
    }

    /// Flushes what is buffered and stops the task.
    pub async fn stop(self) {
        let _ = self.tx.send(Op::Stop);
        let _ = self.task.await;
    }
}

async fn run(mut agg: Aggregator, mut rx: mpsc::UnboundedReceiver<Op>, on_flush: FlushHandler) {
    let period = agg.interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            op = rx.recv() => match op {
                Some(Op::Feed(line)) => {
                    if let Err(e) = agg.feed(&line) {
                        warn!(target: "pmd.stats", error = %e, "sample dropped");
                    }
                }
                Some(Op::Stop) | None => break,
            },
            _ = ticker.tick() => flush(&mut agg, &on_flush),
        }
    }

    flush(&mut agg, &on_flush);
    trace!(target: "pmd.stats", "aggregator stopped");
}

fn flush(agg: &mut Aggregator, on_flush: &FlushHandler) {
    if let Some(snapshot) = agg.flush(SystemTime::now()) {
        on_flush(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collector() -> (FlushHandler, Arc<Mutex<Vec<Snapshot>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: FlushHandler = Arc::new(move |s: &Snapshot| {
            sink.lock().unwrap().push(s.clone());
        });
        (handler, seen)
    }

    #[tokio::test]
    async fn stop_forces_final_flush() {
        let (handler, seen) = collector();
        let statsd = Statsd::spawn("job", Duration::from_secs(3600), handler);

        statsd.feed("k:+1|g");
        statsd.feed("k:+4|g");
        statsd.feed("k:-2|g");
        statsd.stop().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("job.k"), Some(3.0));
    }

    #[tokio::test]
    async fn bad_samples_do_not_stop_the_task() {
        let (handler, seen) = collector();
        let statsd = Statsd::spawn("job", Duration::from_secs(3600), handler);

        statsd.feed("garbage");
        statsd.feed("k:1|c");
        statsd.feed("k:1|g");
        statsd.feed("k:2|c");
        statsd.stop().await;

        assert_eq!(seen.lock().unwrap()[0].get("job.k"), Some(3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_timer() {
        let (handler, seen) = collector();
        let statsd = Statsd::spawn("job", Duration::from_secs(10), handler);

        statsd.feed("hits:2|c");
        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        statsd.stop().await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].get("job.hits"), Some(0.0));
    }

    #[tokio::test]
    async fn nothing_fed_nothing_flushed() {
        let (handler, seen) = collector();
        Statsd::spawn("job", Duration::from_secs(1), handler)
            .stop()
            .await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
