//! Dedicated OS thread per model
//!
//! The model handle is moved into its thread at construction, so inference
//! calls are serialized without a lock and the async runtime never blocks.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

type Task<M> = Box<dyn FnOnce(&mut M) + Send>;

/// Handle to a model running on its own thread
pub struct ModelWorker<M: ?Sized> {
    name: String,
    tx: mpsc::UnboundedSender<Task<M>>,
}

impl<M: ?Sized + Send + 'static> ModelWorker<M> {
    /// Move `model` onto a new named thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn(name: &str, model: Box<M>) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task<M>>();
        let thread_name = format!("model-{name}");

        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let mut model = model;
                while let Some(task) = rx.blocking_recv() {
                    task(&mut *model);
                }
            })
            .map_err(|e| Error::ModelUnavailable(format!("{name}: {e}")))?;

        tracing::debug!(model = name, "model worker started");
        Ok(Self {
            name: name.to_string(),
            tx,
        })
    }

    /// Run `f` against the model and await its result
    ///
    /// A panic inside `f` is turned into an error; the worker keeps running.
    ///
    /// # Errors
    ///
    /// Returns the model's error, or `ModelUnavailable` if the worker is gone
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut M) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let name = self.name.clone();
        let task: Task<M> = Box::new(move |model| {
            let out = catch_unwind(AssertUnwindSafe(|| f(model)))
                .unwrap_or_else(|_| Err(Error::ModelUnavailable(format!("{name} panicked"))));
            let _ = reply_tx.send(out);
        });

        self.tx
            .send(task)
            .map_err(|_| Error::ModelUnavailable(self.name.clone()))?;
        reply_rx
            .await
            .map_err(|_| Error::ModelUnavailable(self.name.clone()))?
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
