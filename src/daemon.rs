use crate::configuration::Configuration;
use crate::device::Device;
use crate::error::Error;
use crate::lifecycle;
use log::{debug, error, info};
use std::future::Future;
use std::time::Duration;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// How long the tasks may take to publish their last messages and disconnect
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Daemon running the device and each of its entities in its own task
pub struct Daemon {
    device: Device,
}

impl Daemon {
    /// Constructs a daemon from the specified configuration
    ///
    /// Every configured plugin is created here, so misconfigurations are reported before anything runs.
    ///
    /// ```
    /// use mqttdevice::{Configuration, Daemon};
    ///
    /// let config = Configuration::load("conf/mqttdevice.toml").expect("Cannot load configuration");
    /// let daemon = Daemon::new(&config).expect("Invalid configuration");
    ///
    /// assert_eq!(daemon.device().registry().len(), 3);
    ///
    /// // later, run daemon.run() in an async function
    /// ```
    pub fn new(config: &Configuration) -> Result<Daemon, Error> {
        let device = Device::new(config)?;
        info!(
            "{}: connecting to MQTT broker {}:{}",
            device.name(),
            config.mqtt.host,
            config.mqtt.port
        );
        Ok(Daemon { device })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Runs until SIGTERM or Ctrl-C is received
    pub async fn run(self) {
        self.run_until(async {
            if let Err(e) = terminated().await {
                error!("Cannot listen for signals: {e}");
            }
        })
        .await;
    }

    /// Runs until `stop` completes, then stops every task
    pub async fn run_until<F: Future<Output = ()>>(mut self, stop: F) {
        let (stopping, shutdown) = watch::channel(false);
        let name = self.device.name().to_string();
        let entities = self.device.take_entities();

        let mut tasks = JoinSet::new();
        for entity in entities {
            tasks.spawn(lifecycle::run(entity, shutdown.clone()));
        }
        tasks.spawn(lifecycle::run(self.device, shutdown));

        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                Some(result) = tasks.join_next() => {
                    if let Err(e) = result {
                        error!("{name}: task failed: {e}");
                    }
                }
            }
        }

        info!("{name}: stopping");
        // Fails only when every task is already gone
        let _ = stopping.send(true);

        let finished = timeout(SHUTDOWN_GRACE_PERIOD, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("{name}: task failed: {e}");
                }
            }
        })
        .await;
        if finished.is_err() {
            debug!("{name}: some tasks did not stop in time, aborting them");
            tasks.shutdown().await;
        }
    }
}

/// Waits for SIGTERM or Ctrl-C
async fn terminated() -> std::io::Result<()> {
    let mut terminal_signal = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            debug!("Ctrl-C received");
            result
        },
        _ = terminal_signal.recv() => {
            debug!("Interrupt received");
            Ok(())
        }
    }
}
