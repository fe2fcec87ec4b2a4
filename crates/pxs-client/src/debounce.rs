//! Request coalescing
//!
//! Window resizes arrive in bursts; the producer only needs the size the
//! viewer settled on. A [`Debouncer`] emits the last value of a burst once
//! the input has been quiet for a window, and skips it if it equals the
//! value emitted before.

use pxs_core::{FieldValue, MessageProtocolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const QUEUE_CAPACITY: usize = 64;

pub struct Debouncer<T> {
    tx: mpsc::Sender<T>,
    handle: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: PartialEq + Clone + Send + 'static,
{
    pub fn new<F>(window: Duration, emit: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<T>(QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            let mut last_emitted: Option<T> = None;

            while let Some(first) = rx.recv().await {
                let mut pending = first;
                loop {
                    match tokio::time::timeout(window, rx.recv()).await {
                        Ok(Some(next)) => pending = next,
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }

                if last_emitted.as_ref() != Some(&pending) {
                    emit(pending.clone());
                    last_emitted = Some(pending);
                }
            }
        });

        Self { tx, handle }
    }

    /// Queue a value; a full queue drops it
    pub fn push(&self, value: T) {
        if self.tx.try_send(value).is_err() {
            debug!("Debouncer queue full, value dropped");
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Sends the settled viewport size to the producer as a `Command`
pub struct ResizeRequester {
    debouncer: Debouncer<(u32, u32)>,
}

impl ResizeRequester {
    pub fn new(registry: Arc<MessageProtocolRegistry>, window: Duration) -> Self {
        let debouncer = Debouncer::new(window, move |(width, height): (u32, u32)| {
            let command = resolution_command(width, height);
            if let Err(e) = registry.send("Command", &[FieldValue::Text(command)]) {
                warn!("Resize to {}x{} not sent: {}", width, height, e);
            }
        });
        Self { debouncer }
    }

    pub fn request(&self, width: u32, height: u32) {
        self.debouncer.push((width, height));
    }
}

/// Console command asking the producer to render at a resolution
pub fn resolution_command(width: u32, height: u32) -> String {
    serde_json::json!({
        "Resolution.Width": width,
        "Resolution.Height": height,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_last_value_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(Duration::from_millis(100), move |v: u32| sink.lock().push(v));

        for v in [1, 2, 3] {
            debouncer.push(v);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![3]);

        debouncer.push(3);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![3]);

        debouncer.push(4);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![3, 4]);
    }

    #[test]
    fn test_resolution_command() {
        let value: serde_json::Value = serde_json::from_str(&resolution_command(1920, 1080)).unwrap();
        assert_eq!(value["Resolution.Width"], 1920);
        assert_eq!(value["Resolution.Height"], 1080);
    }
}
