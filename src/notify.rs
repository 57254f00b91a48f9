use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::SpeechConfig;
use crate::messages::Alert;

pub const DEFAULT_SPEECH_COMMAND: &str = "espeak";
pub const DEFAULT_ALERT_TEXT: &str = "Motion detected";
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can make an alert audible.
#[async_trait]
pub trait NotificationSink: Send + 'static {
    async fn notify(&mut self, alert: &Alert) -> anyhow::Result<()>;
}

/// Speaks alerts through an external text-to-speech command.
///
/// The alert text is passed as the last argument, eg. `espeak "Motion detected"`.
#[derive(Debug, Clone)]
pub struct SpeechSink {
    command: String,
    args: Vec<String>,
}

impl SpeechSink {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        SpeechSink {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &SpeechConfig) -> Self {
        SpeechSink::new(
            config
                .command
                .clone()
                .unwrap_or_else(|| DEFAULT_SPEECH_COMMAND.to_string()),
            config.args.clone().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl NotificationSink for SpeechSink {
    async fn notify(&mut self, alert: &Alert) -> anyhow::Result<()> {
        let status = Command::new(&self.command)
            .args(&self.args)
            .arg(&alert.text)
            .kill_on_drop(true)
            .status()
            .await?;
        if !status.success() {
            bail!("{} exited with {}", self.command, status);
        }
        Ok(())
    }
}

/// Hands alerts to a single worker task that owns the sink.
///
/// The queue is bounded: when the worker falls behind, new alerts are
/// dropped instead of piling up.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Alert>,
    worker: JoinHandle<()>,
}

impl NotificationDispatcher {
    pub fn spawn<S: NotificationSink>(sink: S, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(sink, rx));
        NotificationDispatcher { tx, worker }
    }

    /// Queue an alert without waiting. Returns whether it was accepted.
    pub fn dispatch(&self, alert: Alert) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                warn!("Notification queue full, dropping alert: {}", alert.text);
                false
            }
            Err(TrySendError::Closed(alert)) => {
                warn!("Notification worker gone, dropping alert: {}", alert.text);
                false
            }
        }
    }

    /// Stop accepting alerts and give the worker `timeout` to finish the queue.
    pub async fn shutdown(self, timeout: Duration) {
        let NotificationDispatcher { tx, mut worker } = self;
        drop(tx);

        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(Ok(())) => debug!("Notification worker drained"),
            Ok(Err(err)) => error!("Notification worker failed: {err}"),
            Err(_) => {
                warn!("Notification worker did not drain within {timeout:?}, abandoning it");
                worker.abort();
            }
        }
    }
}

async fn run_worker<S: NotificationSink>(mut sink: S, mut rx: mpsc::Receiver<Alert>) {
    while let Some(alert) = rx.recv().await {
        debug!("Speaking alert: {}", alert.text);
        if let Err(err) = sink.notify(&alert).await {
            warn!("Notification failed: {err:#}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Records every alert it is asked to deliver.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) alerts: Arc<Mutex<Vec<Alert>>>,
    }

    impl RecordingSink {
        pub(crate) fn delivered(&self) -> Vec<String> {
            self.alerts
                .lock()
                .unwrap()
                .iter()
                .map(|a| a.text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&mut self, alert: &Alert) -> anyhow::Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    /// Waits for a permit before each delivery.
    struct GatedSink {
        gate: Arc<Semaphore>,
        inner: RecordingSink,
    }

    #[async_trait]
    impl NotificationSink for GatedSink {
        async fn notify(&mut self, alert: &Alert) -> anyhow::Result<()> {
            self.gate.acquire().await?.forget();
            self.inner.notify(alert).await
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&mut self, _alert: &Alert) -> anyhow::Result<()> {
            bail!("no audio device")
        }
    }

    #[tokio::test]
    async fn delivers_queued_alerts_before_shutdown() {
        let sink = RecordingSink::default();
        let dispatcher = NotificationDispatcher::spawn(sink.clone(), 4);

        assert!(dispatcher.dispatch(Alert::new("one")));
        assert!(dispatcher.dispatch(Alert::new("two")));
        dispatcher.shutdown(Duration::from_secs(1)).await;

        assert_eq!(sink.delivered(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn drops_alerts_when_queue_is_full() {
        let gate = Arc::new(Semaphore::new(0));
        let recorder = RecordingSink::default();
        let dispatcher = NotificationDispatcher::spawn(
            GatedSink {
                gate: gate.clone(),
                inner: recorder.clone(),
            },
            1,
        );

        assert!(dispatcher.dispatch(Alert::new("first")));
        // let the worker take "first" and block on the gate
        tokio::task::yield_now().await;
        assert!(dispatcher.dispatch(Alert::new("second")));
        assert!(!dispatcher.dispatch(Alert::new("third")));

        gate.add_permits(2);
        dispatcher.shutdown(Duration::from_secs(1)).await;
        assert_eq!(recorder.delivered(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn abandons_stuck_worker_after_timeout() {
        let gate = Arc::new(Semaphore::new(0));
        let recorder = RecordingSink::default();
        let dispatcher = NotificationDispatcher::spawn(
            GatedSink {
                gate,
                inner: recorder.clone(),
            },
            1,
        );

        dispatcher.dispatch(Alert::new("never"));
        dispatcher.shutdown(Duration::from_secs(5)).await;
        assert!(recorder.delivered().is_empty());
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let dispatcher = NotificationDispatcher::spawn(FailingSink, 2);
        assert!(dispatcher.dispatch(Alert::new("a")));
        tokio::task::yield_now().await;
        assert!(dispatcher.dispatch(Alert::new("b")));
        dispatcher.shutdown(Duration::from_secs(1)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn speech_sink_reports_command_status() {
        let mut ok = SpeechSink::new("true", vec![]);
        assert!(ok.notify(&Alert::new("hello")).await.is_ok());

        let mut failing = SpeechSink::new("false", vec![]);
        assert!(failing.notify(&Alert::new("hello")).await.is_err());

        let mut missing = SpeechSink::new("pir-monitor-no-such-binary", vec![]);
        assert!(missing.notify(&Alert::new("hello")).await.is_err());
    }

    #[test]
    fn speech_sink_defaults() {
        let sink = SpeechSink::from_config(&SpeechConfig::default());
        assert_eq!(sink.command, DEFAULT_SPEECH_COMMAND);
        assert!(sink.args.is_empty());
    }
}
