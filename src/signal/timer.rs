use super::signal::Signal;
use crate::error::UpstreamError;
use std::future::Future;
use std::time::Duration;

/// A one-shot signal delivering `value` after `delay`, then done.
///
/// # Panics
///
/// Panics if called outside a tokio `LocalSet`.
pub fn delay<T: Clone + 'static>(delay: Duration, value: T) -> Signal<T> {
    let signal = Signal::new();
    let producer = signal.clone();
    tracing::debug!(signal = signal.id(), ?delay, "delay armed");
    tokio::task::spawn_local(async move {
        tokio::time::sleep(delay).await;
        if let Err(err) = producer.finish(value) {
            tracing::warn!(signal = producer.id(), %err, "delayed delivery failed");
        }
    });
    signal
}

/// A one-shot signal that fails with `error` after `delay`.
///
/// # Panics
///
/// Panics if called outside a tokio `LocalSet`.
pub fn delay_error<T: Clone + 'static>(delay: Duration, error: UpstreamError) -> Signal<T> {
    let signal = Signal::new();
    let producer = signal.clone();
    tokio::task::spawn_local(async move {
        tokio::time::sleep(delay).await;
        if let Err(err) = producer.fail(error) {
            tracing::warn!(signal = producer.id(), %err, "delayed failure could not be delivered");
        }
    });
    signal
}

/// A signal ticking `1, 2, 3, ...` every `interval`.
///
/// The timer only re-arms while someone is listening: once a tick finds no
/// subscriber left, no further tick is scheduled.
///
/// # Panics
///
/// Panics if called outside a tokio `LocalSet`.
pub fn every(interval: Duration) -> Signal<u64> {
    let signal = Signal::new();
    let producer = signal.clone();
    tokio::task::spawn_local(async move {
        let mut tick = 0;
        loop {
            tokio::time::sleep(interval).await;
            tick += 1;
            match producer.emit(tick) {
                Ok(false) => continue,
                Ok(true) => {
                    tracing::debug!(signal = producer.id(), tick, "no listeners left, timer stopped");
                    break;
                }
                Err(err) => {
                    tracing::warn!(signal = producer.id(), %err, "tick delivery failed, timer stopped");
                    break;
                }
            }
        }
    });
    signal
}

/// A one-shot signal resolved by a future: its output is delivered as the
/// last value, its error fails the signal.
///
/// # Panics
///
/// Panics if called outside a tokio `LocalSet`.
pub fn from_future<T, F>(future: F) -> Signal<T>
where
    T: Clone + 'static,
    F: Future<Output = Result<T, UpstreamError>> + 'static,
{
    let signal = Signal::new();
    let producer = signal.clone();
    tokio::task::spawn_local(async move {
        let delivered = match future.await {
            Ok(value) => producer.finish(value),
            Err(error) => producer.fail(error),
        };
        if let Err(err) = delivered {
            tracing::warn!(signal = producer.id(), %err, "future result could not be delivered");
        }
    });
    signal
}
