//! The loop's task queue: the only way to get work onto the interaction loop.

use std::future::Future;

use tokio::{runtime::Handle, sync::mpsc};

/// Work to run against the loop's state.
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Queue owned by the interaction loop.
pub struct TaskQueue<S> {
    tx: mpsc::UnboundedSender<Task<S>>,
    rx: mpsc::UnboundedReceiver<Task<S>>,
}

impl<S> Default for TaskQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> TaskQueue<S> {
    /// Empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Handle for scheduling onto this queue.
    pub fn handle(&self) -> LoopHandle<S> {
        LoopHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run everything queued before this call. Tasks scheduled while running
    /// wait for the next tick.
    pub fn run_tick(&mut self, state: &mut S) -> usize {
        let mut batch = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            batch.push(task);
        }
        let ran = batch.len();
        for task in batch {
            task(state);
        }
        ran
    }

    /// Wait for the next task and run it alone.
    pub async fn run_next(&mut self, state: &mut S) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task(state);
                true
            }
            None => false,
        }
    }

    /// Tasks waiting for a tick.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Cloneable sender onto a [`TaskQueue`].
pub struct LoopHandle<S> {
    tx: mpsc::UnboundedSender<Task<S>>,
}

impl<S> Clone for LoopHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> LoopHandle<S> {
    /// Run `f` on the loop at the next tick. False once the loop is gone.
    pub fn defer(&self, f: impl FnOnce(&mut S) + Send + 'static) -> bool {
        self.tx.send(Box::new(f)).is_ok()
    }

    /// Await `fut` on `runtime`, then hand its output to `f` on the loop.
    pub fn after<T, Fut, F>(&self, runtime: &Handle, fut: Fut, f: F)
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        F: FnOnce(&mut S, T) + Send + 'static,
    {
        let handle = self.clone();
        runtime.spawn(async move {
            let value = fut.await;
            handle.defer(move |state| f(state, value));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_from_a_task_waits_a_tick() {
        let mut queue: TaskQueue<Vec<u32>> = TaskQueue::new();
        let handle = queue.handle();
        let inner = handle.clone();
        handle.defer(move |log| {
            log.push(1);
            inner.defer(|log| log.push(2));
        });

        let mut log = Vec::new();
        assert_eq!(queue.run_tick(&mut log), 1);
        assert_eq!(log, vec![1]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_tick(&mut log), 1);
        assert_eq!(log, vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn async_results_come_back_through_the_queue() {
        let mut queue: TaskQueue<Vec<u32>> = TaskQueue::new();
        queue
            .handle()
            .after(&Handle::current(), async { 7 }, |log, value| log.push(value));

        let mut log = Vec::new();
        assert!(queue.run_next(&mut log).await);
        assert_eq!(log, vec![7]);
    }
}
