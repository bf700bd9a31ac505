//! # Sensor Acquisition Tasks
//!
//! Every sensor runs its own background loop that acquires a value, writes
//! it into the sensor's slot, and waits for its poll interval. The loop owns
//! the device exclusively while it runs; [`SensorTask::stop`] hands the
//! device back so it can be torn down.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::slot::{slot, SlotReader, SlotWriter};
use crate::error::{PayloadError, Result};

/// Minimum pause after a failed acquisition before the device is retried
const FAILURE_BACKOFF: Duration = Duration::from_millis(500);

/// What a failed acquisition does to the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the last good value
    Retain,
    /// Publish "no value" so a stale number is never reported
    Clear,
}

/// A device that can produce readings
#[async_trait]
pub trait Acquire: Send + 'static {
    /// The decoded value written into the slot
    type Value: Clone + Send + Sync + 'static;

    /// Human-readable sensor name for logs
    fn name(&self) -> &str;

    /// Open the device
    async fn setup(&mut self) -> Result<()>;

    /// Produce one reading
    async fn acquire(&mut self) -> Result<Self::Value>;

    /// Release the device
    async fn teardown(&mut self) -> Result<()>;

    /// Pause between acquisitions
    fn poll_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn on_failure(&self) -> FailurePolicy {
        FailurePolicy::Retain
    }
}

/// Lifecycle controls common to all sensor tasks
#[async_trait]
pub trait SensorControl: Send {
    fn name(&self) -> &str;

    async fn setup(&mut self) -> Result<()>;

    /// Begin background acquisition
    fn start(&mut self) -> Result<()>;

    /// End background acquisition and wait for the loop to exit
    async fn stop(&mut self) -> Result<()>;

    async fn teardown(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;
}

struct Running<A> {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<A>,
}

/// Background runner for one [`Acquire`] device
pub struct SensorTask<A: Acquire> {
    name: String,
    device: Option<A>,
    running: Option<Running<A>>,
    writer: SlotWriter<A::Value>,
    reader: SlotReader<A::Value>,
}

impl<A: Acquire> SensorTask<A> {
    pub fn new(device: A) -> Self {
        let (writer, reader) = slot();
        Self {
            name: device.name().to_string(),
            device: Some(device),
            running: None,
            writer,
            reader,
        }
    }

    /// A reader for this sensor's slot
    pub fn reader(&self) -> SlotReader<A::Value> {
        self.reader.clone()
    }

    fn device_mut(&mut self) -> Result<&mut A> {
        let name = &self.name;
        self.device
            .as_mut()
            .ok_or_else(|| PayloadError::DeviceIo(format!("{} is busy acquiring", name)))
    }
}

#[async_trait]
impl<A: Acquire> SensorControl for SensorTask<A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self) -> Result<()> {
        self.device_mut()?.setup().await
    }

    fn start(&mut self) -> Result<()> {
        let device = self.device.take().ok_or_else(|| {
            PayloadError::DeviceIo(format!("{} is already running", self.name))
        })?;

        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(acquisition_loop(device, self.writer.clone(), stop_rx));
        self.running = Some(Running { stop, handle });

        info!("{} acquisition started", self.name);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The loop also exits if the receiver sees the sender dropped
        let _ = running.stop.send(());

        match running.handle.await {
            Ok(device) => {
                self.device = Some(device);
                info!("{} acquisition stopped", self.name);
                Ok(())
            }
            Err(e) => Err(PayloadError::DeviceIo(format!(
                "{} acquisition task ended abnormally: {}",
                self.name, e
            ))),
        }
    }

    async fn teardown(&mut self) -> Result<()> {
        self.device_mut()?.teardown().await
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

async fn acquisition_loop<A: Acquire>(
    mut device: A,
    slot: SlotWriter<A::Value>,
    mut stop: oneshot::Receiver<()>,
) -> A {
    loop {
        let result = tokio::select! {
            _ = &mut stop => break,
            result = device.acquire() => result,
        };

        let pause = match result {
            Ok(value) => {
                slot.publish(value);
                device.poll_interval()
            }
            Err(e) => {
                warn!("{} acquisition failed: {}", device.name(), e);
                if device.on_failure() == FailurePolicy::Clear {
                    slot.clear();
                }
                device.poll_interval().max(FAILURE_BACKOFF)
            }
        };

        if pause.is_zero() {
            // Let the stop signal and other tasks in between back-to-back reads
            tokio::task::yield_now().await;
            if stop_requested(&mut stop) {
                break;
            }
            continue;
        }

        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    debug!("{} acquisition loop exiting", device.name());
    device
}

fn stop_requested(stop: &mut oneshot::Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Device that replays a script of readings, then repeats the last one
    pub(crate) struct ScriptedDevice {
        pub script: VecDeque<Result<f64>>,
        pub policy: FailurePolicy,
        pub events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedDevice {
        pub(crate) fn new(script: Vec<Result<f64>>, policy: FailurePolicy) -> Self {
            Self {
                script: script.into(),
                policy,
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Acquire for ScriptedDevice {
        type Value = f64;

        fn name(&self) -> &str {
            "scripted"
        }

        async fn setup(&mut self) -> Result<()> {
            self.events.lock().unwrap().push("setup");
            Ok(())
        }

        async fn acquire(&mut self) -> Result<f64> {
            match self.script.pop_front() {
                Some(step) => step,
                // Script exhausted: block until stopped
                None => std::future::pending().await,
            }
        }

        async fn teardown(&mut self) -> Result<()> {
            self.events.lock().unwrap().push("teardown");
            Ok(())
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(100)
        }

        fn on_failure(&self) -> FailurePolicy {
            self.policy
        }
    }

    fn io_failure() -> Result<f64> {
        Err(PayloadError::DeviceIo("bus fault".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_publishes_readings() {
        let mut task = SensorTask::new(ScriptedDevice::new(
            vec![Ok(1.0), Ok(2.0)],
            FailurePolicy::Retain,
        ));
        let reader = task.reader();

        task.setup().await.unwrap();
        task.start().unwrap();
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(reader.value(), Some(1.0));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reader.value(), Some(2.0));

        task.stop().await.unwrap();
        assert!(!task.is_running());
        task.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retain_policy_keeps_last_value() {
        let mut task = SensorTask::new(ScriptedDevice::new(
            vec![Ok(5.0), io_failure()],
            FailurePolicy::Retain,
        ));
        let reader = task.reader();

        task.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(reader.value(), Some(5.0));
        task.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_policy_drops_stale_value() {
        let mut task = SensorTask::new(ScriptedDevice::new(
            vec![Ok(5.0), io_failure()],
            FailurePolicy::Clear,
        ));
        let reader = task.reader();

        task.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let reading = reader.latest();
        assert_eq!(reading.value, None);
        assert!(reading.last_updated.is_some());
        task.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_device_for_teardown() {
        let device = ScriptedDevice::new(vec![], FailurePolicy::Retain);
        let events = Arc::clone(&device.events);
        let mut task = SensorTask::new(device);

        task.setup().await.unwrap();
        task.start().unwrap();

        // Device is owned by the loop while running
        assert!(task.teardown().await.is_err());

        task.stop().await.unwrap();
        task.teardown().await.unwrap();

        assert_eq!(*events.lock().unwrap(), vec!["setup", "teardown"]);
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let mut task = SensorTask::new(ScriptedDevice::new(vec![], FailurePolicy::Retain));
        task.start().unwrap();
        assert!(task.start().is_err());
        task.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_noop() {
        let mut task = SensorTask::new(ScriptedDevice::new(vec![], FailurePolicy::Retain));
        assert!(task.stop().await.is_ok());
        assert_eq!(task.name(), "scripted");
    }
}
