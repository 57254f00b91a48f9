use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, trace, warn};

use crate::cloud::{CloudClient, StatusResponse};
use crate::detector::{self, Signal};
use crate::messages::{Alert, EventKind, PresenceState, SensorReading};
use crate::notify::NotificationDispatcher;
use crate::recovery::{PollFailure, Recovery, RecoveryPolicy};

/// Time between the end of one successful cycle and the next query.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Datapoint code of the motion sensor.
pub const PIR_CODE: &str = "pir";

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub device_id: String,
    pub alert_text: String,
    pub drain_timeout: Duration,
}

pub struct Manager<C, P> {
    client: C,
    policy: P,
    dispatcher: NotificationDispatcher,
    settings: MonitorSettings,
}

impl<C: CloudClient, P: RecoveryPolicy> Manager<C, P> {
    pub fn new(
        client: C,
        policy: P,
        dispatcher: NotificationDispatcher,
        settings: MonitorSettings,
    ) -> Self {
        Manager {
            client,
            policy,
            dispatcher,
            settings,
        }
    }

    /// Poll until `shutdown` resolves.
    ///
    /// The presence state lives here and is only replaced by a cycle that
    /// produced a reading; failed cycles leave it as it was.
    pub async fn run_loop(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut state = PresenceState::Absent;

        loop {
            let result = tokio::select! {
                _ = &mut shutdown => Err(PollFailure::Cancelled),
                result = self.poll_once(state) => result,
            };

            let delay = match result {
                Ok(next) => {
                    state = next;
                    POLL_INTERVAL
                }
                // shutdown has completed and must not be polled again
                Err(PollFailure::Cancelled) => {
                    info!("Stopped by user.");
                    break;
                }
                Err(failure) => match self.policy.recover(&failure) {
                    Recovery::RetryAfter(delay) => {
                        report_failure(&failure, delay);
                        delay
                    }
                    Recovery::Stop => {
                        error!("{failure}, giving up");
                        break;
                    }
                },
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopped by user.");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.dispatcher.shutdown(self.settings.drain_timeout).await;
    }

    /// Query the device once and act on the reading. Returns the next state.
    async fn poll_once(&mut self, previous: PresenceState) -> Result<PresenceState, PollFailure> {
        let polled_at = Local::now();
        let response = self.client.get_status(&self.settings.device_id).await?;
        debug!("{polled_at} - Device response: {response:?}");

        let reading = read_sensor(&response, polled_at)?;
        let detection = detector::detect(previous, &reading);
        self.act(detection.signal);
        Ok(detection.next)
    }

    fn act(&self, signal: Signal) {
        match signal {
            Signal::Transition(event) => {
                debug!("Presence {} -> {}", event.from, event.to);
                match event.kind {
                    EventKind::MotionDetected => {
                        info!("{} - Motion detected!", event.timestamp);
                        self.dispatcher
                            .dispatch(Alert::new(self.settings.alert_text.as_str()));
                    }
                    EventKind::NoMotion => info!("{} - No motion detected.", event.timestamp),
                }
            }
            Signal::Steady => trace!("No change in presence"),
            Signal::UnexpectedValue(raw) => warn!("Unexpected PIR value received: {raw}"),
        }
    }
}

fn read_sensor(
    response: &StatusResponse,
    polled_at: DateTime<Local>,
) -> Result<SensorReading, PollFailure> {
    if !response.success {
        return Err(PollFailure::ApiFailure {
            code: response.code.unwrap_or_default(),
            msg: response.msg.clone().unwrap_or_default(),
        });
    }

    response
        .datapoint(PIR_CODE)
        .map(|raw| SensorReading::new(raw, polled_at))
        .ok_or(PollFailure::MissingData(PIR_CODE))
}

fn report_failure(failure: &PollFailure, delay: Duration) {
    match failure {
        PollFailure::MissingData(_) => warn!("{failure}, retrying in {delay:?}"),
        _ => error!("{failure}, retrying in {delay:?}"),
    }
}
