// src/engine/pool.rs
use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use crate::config::SyncOptions;
use crate::progress::Progress;

/// Soft-stop signal polled by pool workers before they pick the next item.
/// Raising it never interrupts a fetch already in flight.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed-width pool of fetch workers feeding a single consumer.
///
/// Workers pull item indices from a shared counter, run `work` (fetch + parse) and send
/// the outcome back over a channel. The calling thread is the only consumer: it
/// re-sequences outcomes into item order and hands them to `consume`, so all state
/// merges happen on one path even though fetches complete out of order.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    workers: usize,
    pause: Duration,
    jitter_ms: u64,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1), pause: Duration::ZERO, jitter_ms: 0 }
    }

    pub fn from_options(opts: &SyncOptions) -> Self {
        Self { workers: opts.workers.max(1), pause: opts.request_pause, jitter_ms: opts.jitter_ms }
    }

    /// Run `work` over `items`, consuming outcomes in item order.
    ///
    /// `consume` returning `ControlFlow::Break` raises `token`: no further items are
    /// dispatched, in-flight ones finish and are dropped. Returns how many outcomes
    /// were consumed.
    pub fn run_ordered<T, R, E, W, C>(
        &self,
        items: &[T],
        token: &CancelToken,
        progress: &mut dyn Progress,
        work: W,
        mut consume: C,
    ) -> usize
    where
        T: Sync + Display,
        R: Send,
        E: Send + Display,
        W: Fn(&T) -> Result<R, E> + Sync,
        C: FnMut(&T, Result<R, E>) -> ControlFlow<()>,
    {
        if items.is_empty() {
            return 0;
        }
        progress.begin(items.len());

        let workers = self.workers.min(items.len());
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, Result<R, E>)>();

        let consumed = thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let work = &work;
                let pause = self.pause;
                let jitter_ms = self.jitter_ms;
                scope.spawn(move || {
                    loop {
                        if token.is_cancelled() {
                            break;
                        }
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        if i >= items.len() {
                            break;
                        }
                        let outcome = work(&items[i]);
                        if tx.send((i, outcome)).is_err() {
                            break; // consumer is gone
                        }
                        let jitter = if jitter_ms > 0 { (i as u64) % jitter_ms } else { 0 };
                        let wait = pause + Duration::from_millis(jitter);
                        if !wait.is_zero() {
                            thread::sleep(wait); // be polite
                        }
                    }
                });
            }
            drop(tx); // consumer is sole receiver now

            let mut pending: BTreeMap<usize, Result<R, E>> = BTreeMap::new();
            let mut expected = 0usize;
            let mut consumed = 0usize;
            'recv: for (i, outcome) in rx.iter() {
                pending.insert(i, outcome);
                while let Some(outcome) = pending.remove(&expected) {
                    let item = &items[expected];
                    match &outcome {
                        Ok(_) => progress.item_done(&item.to_string()),
                        Err(e) => progress.item_failed(&item.to_string(), &e.to_string()),
                    }
                    expected += 1;
                    consumed += 1;
                    if consume(item, outcome).is_break() {
                        token.cancel();
                        break 'recv;
                    }
                }
            }
            drop(rx);
            consumed
        });

        progress.finish();
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use std::sync::Mutex;

    #[test]
    fn outcomes_are_consumed_in_item_order() {
        let items: Vec<u32> = (1..=40).collect();
        let mut seen = Vec::new();
        let n = WorkerPool::new(8).run_ordered(
            &items,
            &CancelToken::new(),
            &mut NullProgress,
            |&i| {
                // later items finish first
                thread::sleep(Duration::from_micros(u64::from(40 - i) * 50));
                Ok::<_, String>(i * 10)
            },
            |&i, out| {
                seen.push((i, out.unwrap()));
                ControlFlow::Continue(())
            },
        );
        assert_eq!(n, 40);
        assert_eq!(seen, items.iter().map(|&i| (i, i * 10)).collect::<Vec<_>>());
    }

    #[test]
    fn break_raises_soft_stop_and_halts_dispatch() {
        let items: Vec<u32> = (1..=200).collect();
        let started = Mutex::new(0usize);
        let token = CancelToken::new();
        let n = WorkerPool::new(2).run_ordered(
            &items,
            &token,
            &mut NullProgress,
            |&i| {
                *started.lock().unwrap() += 1;
                thread::sleep(Duration::from_millis(1));
                if i == 3 { Err(format!("page {i} failed")) } else { Ok(i) }
            },
            |_, out| if out.is_err() { ControlFlow::Break(()) } else { ControlFlow::Continue(()) },
        );
        assert_eq!(n, 3);
        assert!(token.is_cancelled());
        assert!(*started.lock().unwrap() < items.len());
    }

    #[test]
    fn pre_cancelled_token_dispatches_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let n = WorkerPool::new(4).run_ordered(
            &[1u32, 2, 3],
            &token,
            &mut NullProgress,
            |&i| Ok::<_, String>(i),
            |_, _| ControlFlow::Continue(()),
        );
        assert_eq!(n, 0);
    }
}
