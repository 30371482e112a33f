use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::signals::{SignalHandler, SignalType};
use crate::audio::{
    DeviceBindings, StateChange, StepPolicy, SubscriptionToken, VolumeKeyController,
    VolumeMonitor, VolumeState, sleep_until_deadline,
};
use crate::config::{Config, ConfigLoader};
use crate::error::InterceptorError;
use crate::events::{EventReceiver, EventSender, HudEvent, event_channel};
use crate::keys::{KeyEventSink, MediaKeyInterceptor};
use crate::system::{AudioHardware, EventTapBackend, FileSystemInterface, PermissionChecker};

/// The engine context: owns the volume monitor, the key interceptor and the
/// event channel feeding them. Everything that mutates engine state runs
/// inside [`HudService::run_until`].
pub struct HudService<A, T, P>
where
    A: AudioHardware + Clone + 'static,
    T: EventTapBackend,
    P: PermissionChecker + 'static,
{
    config: Config,
    monitor: VolumeMonitor<A>,
    interceptor: MediaKeyInterceptor<T, P>,
    policy_updates: watch::Sender<StepPolicy>,
    events: EventSender,
    event_rx: EventReceiver,
}

impl<A, T, P> HudService<A, T, P>
where
    A: AudioHardware + Clone + 'static,
    T: EventTapBackend,
    P: PermissionChecker + 'static,
{
    pub fn new(audio_system: A, tap_backend: T, permissions: P, config: Config) -> Self {
        let (events, event_rx) = event_channel();

        let policy = StepPolicy::from_config(&config.volume);
        let (policy_updates, policy_rx) = watch::channel(policy);

        let controller = VolumeKeyController::new(audio_system.clone(), policy);
        let sink = KeyEventSink::new(controller, policy_rx, events.clone());
        let interceptor = MediaKeyInterceptor::new(tap_backend, permissions, Box::new(sink));
        let monitor = VolumeMonitor::new(audio_system, events.clone(), &config.monitor);

        Self {
            config,
            monitor,
            interceptor,
            policy_updates,
            events,
            event_rx,
        }
    }

    /// Start watching the mixer and intercepting keys. Missing accessibility
    /// permission is not an error: a poll is started instead and the tap comes
    /// up once access is granted. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        info!("Starting volume HUD engine");
        self.monitor.start()?;
        self.start_interception();
        Ok(())
    }

    /// Stop interception first, then release the mixer listeners
    pub fn stop(&mut self) {
        info!("Stopping volume HUD engine");
        self.interceptor.stop();
        self.monitor.stop();
    }

    /// Run with process signal handling until SIGTERM/SIGINT
    pub async fn run<F: FileSystemInterface>(&mut self, loader: &ConfigLoader<F>) -> Result<()> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let signal_handler = SignalHandler::new(signal_tx);
        let signal_task = tokio::spawn(async move {
            if let Err(e) = signal_handler.listen_for_signals().await {
                error!("Signal handler error: {}", e);
            }
        });

        let result = match self.start() {
            Ok(()) => self.run_until(signal_rx, loader).await,
            Err(e) => Err(e),
        };

        signal_task.abort();
        self.stop();
        result
    }

    /// The engine loop. Returns on [`SignalType::Shutdown`] or when the signal
    /// channel closes; the caller is responsible for `start`/`stop`.
    pub async fn run_until<F: FileSystemInterface>(
        &mut self,
        mut signals: mpsc::UnboundedReceiver<SignalType>,
        loader: &ConfigLoader<F>,
    ) -> Result<()> {
        info!("Engine loop running");

        loop {
            let debounce_deadline = self.monitor.debounce_deadline();

            tokio::select! {
                signal = signals.recv() => {
                    match signal {
                        Some(SignalType::Reload) => self.reload_config(loader),
                        Some(SignalType::Shutdown) => {
                            info!("Shutdown requested");
                            break;
                        }
                        None => {
                            warn!("Signal channel closed");
                            break;
                        }
                    }
                }
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                _ = sleep_until_deadline(debounce_deadline) => {
                    self.monitor.on_debounce_elapsed();
                }
            }
        }

        info!("Engine loop finished");
        Ok(())
    }

    pub fn handle_event(&mut self, event: HudEvent) {
        debug!("Engine event: {}", event);
        match event {
            HudEvent::PermissionGranted => match self.interceptor.start() {
                Ok(()) => info!("Media key interception enabled after permission grant"),
                Err(e) => warn!("Could not start interception after permission grant: {}", e),
            },
            other => self.monitor.handle_event(other),
        }
    }

    /// Apply the reloadable parts of a new configuration: step policy and
    /// debounce window
    pub fn apply_config(&mut self, config: Config) {
        let policy = StepPolicy::from_config(&config.volume);
        self.policy_updates.send_replace(policy);
        self.monitor
            .set_debounce_window(config.monitor.debounce_window());

        if config.monitor.watch_device_liveness != self.config.monitor.watch_device_liveness {
            warn!("monitor.watch_device_liveness changes take effect after a restart");
        }

        self.config = config;
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionToken
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.monitor.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.monitor.unsubscribe(token)
    }

    pub fn current(&self) -> VolumeState {
        self.monitor.current()
    }

    pub fn bindings(&self) -> Option<DeviceBindings> {
        self.monitor.bindings()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_intercepting(&self) -> bool {
        self.interceptor.is_active()
    }

    pub fn is_waiting_for_permission(&self) -> bool {
        self.interceptor.is_polling()
    }

    fn start_interception(&mut self) {
        match self.interceptor.start() {
            Ok(()) => {}
            Err(InterceptorError::PermissionDenied) => {
                let permissions = &self.config.permissions;
                if permissions.prompt_on_start {
                    if let Err(e) = self.interceptor.request_permission() {
                        warn!("Failed to request accessibility permission: {:#}", e);
                    }
                }
                if let Err(e) = self.interceptor.poll_until_granted(
                    permissions.poll_interval(),
                    permissions.poll_max_attempts,
                    self.events.clone(),
                ) {
                    debug!("Permission poll not started: {}", e);
                }
            }
            Err(e) => error!("Media key interception unavailable: {}", e),
        }
    }

    fn reload_config<F: FileSystemInterface>(&mut self, loader: &ConfigLoader<F>) {
        match loader.reload_config() {
            Ok(config) => {
                self.apply_config(config);
                info!("Configuration reloaded successfully");
            }
            Err(e) => error!("Failed to reload configuration, keeping current: {:#}", e),
        }
    }
}
