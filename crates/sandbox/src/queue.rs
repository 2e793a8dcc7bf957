//! C5: deferred script queue (spec.md §4.5). Preserves FIFO order for
//! `defer`/module-like scripts discovered while the streaming loader (C3) is
//! still parsing, so slow network fetches never reorder execution relative
//! to script order in the source document, while still letting the loader
//! fetch them in parallel ahead of time.

use std::collections::VecDeque;

use anyhow::Error;
use futures::future::BoxFuture;

/// A script awaiting execution once its turn in FIFO order arrives.
#[derive(Clone, Debug)]
pub struct DeferredScript {
    /// Absolute URL, for an external `<script defer src=…>`.
    pub url: Option<String>,
    /// Inline source, for a `<script defer>…</script>` body.
    pub inline_source: Option<String>,
}

/// FIFO queue of scripts whose execution is deferred until the document has
/// otherwise finished streaming in.
#[derive(Default)]
pub struct DeferredScriptQueue {
    pending: VecDeque<DeferredScript>,
}

impl DeferredScriptQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, script: DeferredScript) {
        self.pending.push_back(script);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pop the next script in FIFO order, for callers that need to hold a
    /// `&mut` engine reference across the await themselves rather than
    /// handing it to `drain`'s closures (`qiankun_loader::load_entry`).
    pub fn pop_front(&mut self) -> Option<DeferredScript> {
        self.pending.pop_front()
    }

    /// Run every queued script in order, awaiting each before starting the
    /// next. A script that errors is reported to `on_error` (the caller
    /// wires this to the global error bus, C10) but does not stop the
    /// queue — subsequent scripts still execute (spec.md §4.5).
    pub async fn drain<'a, R, E>(&mut self, mut run: R, mut on_error: E)
    where
        R: FnMut(&DeferredScript) -> BoxFuture<'a, Result<(), Error>>,
        E: FnMut(&DeferredScript, &Error),
    {
        while let Some(script) = self.pending.pop_front() {
            if let Err(error) = run(&script).await {
                on_error(&script, &error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn drain_preserves_fifo_order_and_keeps_going_after_an_error() {
        let mut queue = DeferredScriptQueue::new();
        for i in 0..3 {
            queue.enqueue(DeferredScript { url: None, inline_source: Some(i.to_string()) });
        }

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let errors = Arc::new(AtomicUsize::new(0));
        let order_clone = Arc::clone(&order);

        queue
            .drain(
                move |script| {
                    let order = Arc::clone(&order_clone);
                    let source = script.inline_source.clone().unwrap_or_default();
                    Box::pin(async move {
                        order.lock().unwrap_or_else(|e| e.into_inner()).push(source.clone());
                        if source == "1" {
                            return Err(anyhow::anyhow!("boom"));
                        }
                        Ok(())
                    })
                },
                |_script, _error| {
                    errors.fetch_add(1, Ordering::Relaxed);
                },
            )
            .await;

        assert_eq!(*order.lock().unwrap_or_else(|e| e.into_inner()), vec!["0", "1", "2"]);
        assert_eq!(errors.load(Ordering::Relaxed), 1);
        assert!(queue.is_empty());
    }
}
