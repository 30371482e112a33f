use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::media_key::decode_system_defined;
use crate::audio::{MediaKeyHandlingResult, StepPolicy, VolumeKeyController};
use crate::error::InterceptorError;
use crate::events::{EventSender, HudEvent};
use crate::system::{
    AudioHardware, EventTapBackend, InstalledTap, PermissionChecker, TapEvent, TapEventSink,
    TapVerdict,
};

/// Tap-thread side of the interceptor: decodes raw events and drives the
/// volume key controller
pub struct KeyEventSink<A: AudioHardware> {
    controller: VolumeKeyController<A>,
    policy_updates: watch::Receiver<StepPolicy>,
    events: EventSender,
}

impl<A: AudioHardware> KeyEventSink<A> {
    pub fn new(
        controller: VolumeKeyController<A>,
        policy_updates: watch::Receiver<StepPolicy>,
        events: EventSender,
    ) -> Self {
        Self {
            controller,
            policy_updates,
            events,
        }
    }

    fn apply_policy_update(&mut self) {
        if self.policy_updates.has_changed().unwrap_or(false) {
            let policy = *self.policy_updates.borrow_and_update();
            debug!("Step policy updated: {:?}", policy);
            self.controller.set_policy(policy);
        }
    }
}

impl<A: AudioHardware> TapEventSink for KeyEventSink<A> {
    fn on_event(&mut self, event: TapEvent) -> TapVerdict {
        let (subtype, data1, flags) = match event {
            TapEvent::DisabledByTimeout | TapEvent::DisabledByUserInput => {
                warn!("Key event tap was disabled ({:?}), re-enabling", event);
                return TapVerdict::Reenable;
            }
            TapEvent::Other => return TapVerdict::PassThrough,
            TapEvent::SystemDefined {
                subtype,
                data1,
                flags,
            } => (subtype, data1, flags),
        };

        let Some(press) = decode_system_defined(subtype, data1, flags) else {
            return TapVerdict::PassThrough;
        };

        if !press.key.is_intercepted() || !press.is_down {
            return TapVerdict::PassThrough;
        }
        if press.is_repeat {
            debug!("Auto-repeat of {}", press.key);
        }

        self.apply_policy_update();

        match self
            .controller
            .handle(press.key, press.modifiers.granularity())
        {
            MediaKeyHandlingResult::PassThrough => TapVerdict::PassThrough,
            MediaKeyHandlingResult::Consumed { did_change } => {
                // No property notification follows an unchanged mixer, so
                // nudge the HUD directly
                if !did_change && self.events.send(HudEvent::KeyFeedback(press.key)).is_err() {
                    debug!("Engine loop gone, dropping key feedback");
                }
                TapVerdict::Consume
            }
        }
    }
}

/// Owns the system-wide key event tap.
///
/// Inactive, the interceptor holds the event sink; active, the sink lives on the
/// tap's thread and comes back when the tap is removed.
pub struct MediaKeyInterceptor<T: EventTapBackend, P: PermissionChecker> {
    backend: T,
    permissions: Arc<P>,
    sink: Option<Box<dyn TapEventSink>>,
    tap: Option<Box<dyn InstalledTap>>,
    permission_poll: Option<JoinHandle<()>>,
}

impl<T: EventTapBackend, P: PermissionChecker> MediaKeyInterceptor<T, P> {
    pub fn new(backend: T, permissions: P, sink: Box<dyn TapEventSink>) -> Self {
        Self {
            backend,
            permissions: Arc::new(permissions),
            sink: Some(sink),
            tap: None,
            permission_poll: None,
        }
    }

    /// Install the tap. Succeeds immediately when already active; fails without
    /// side effects when accessibility access is missing.
    pub fn start(&mut self) -> Result<(), InterceptorError> {
        if self.tap.is_some() {
            debug!("Media key interceptor already active");
            return Ok(());
        }

        if !self.permissions.is_trusted() {
            warn!("Cannot intercept media keys without accessibility permission");
            return Err(InterceptorError::PermissionDenied);
        }

        let Some(sink) = self.sink.take() else {
            return Err(InterceptorError::TapInstall(
                "event sink was lost with a previous tap".to_string(),
            ));
        };

        match self.backend.install(sink) {
            Ok(tap) => {
                self.tap = Some(tap);
                info!("Media key interceptor started");
                Ok(())
            }
            Err(failure) => {
                error!("Failed to install key event tap: {}", failure.reason);
                self.sink = failure.sink;
                Err(InterceptorError::TapInstall(failure.reason))
            }
        }
    }

    /// Cancel any permission poll, then tear down the tap
    pub fn stop(&mut self) {
        self.cancel_permission_poll();

        if let Some(tap) = self.tap.take() {
            self.sink = tap.remove();
            if self.sink.is_none() {
                error!("Key event tap thread exited abnormally; interception cannot restart");
            }
            info!("Media key interceptor stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.tap.is_some()
    }

    pub fn has_permission(&self) -> bool {
        self.permissions.is_trusted()
    }

    pub fn request_permission(&self) -> anyhow::Result<()> {
        self.permissions.request()
    }

    pub fn is_polling(&self) -> bool {
        self.permission_poll
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel_permission_poll(&mut self) {
        if let Some(handle) = self.permission_poll.take() {
            handle.abort();
            debug!("Permission poll cancelled");
        }
    }
}

impl<T: EventTapBackend, P: PermissionChecker + 'static> MediaKeyInterceptor<T, P> {
    /// Re-check permission every `interval`, at most `max_attempts` times, and
    /// send [`HudEvent::PermissionGranted`] once it is granted. Running out of
    /// attempts ends the poll quietly. Must be called within a tokio runtime.
    pub fn poll_until_granted(
        &mut self,
        interval: Duration,
        max_attempts: u32,
        events: EventSender,
    ) -> Result<(), InterceptorError> {
        if self.is_polling() {
            return Err(InterceptorError::AlreadyPolling);
        }

        let permissions = Arc::clone(&self.permissions);
        info!(
            "Waiting for accessibility permission (every {:?}, {} attempts)",
            interval, max_attempts
        );

        self.permission_poll = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            for attempt in 1..=max_attempts {
                ticker.tick().await;
                if permissions.is_trusted() {
                    info!("Accessibility permission granted after {} checks", attempt);
                    let _ = events.send(HudEvent::PermissionGranted);
                    return;
                }
                debug!("Permission check {}/{}: not yet granted", attempt, max_attempts);
            }

            warn!(
                "Accessibility permission still missing after {} checks, giving up",
                max_attempts
            );
        }));

        Ok(())
    }
}

impl<T: EventTapBackend, P: PermissionChecker> Drop for MediaKeyInterceptor<T, P> {
    fn drop(&mut self) {
        self.stop();
    }
}
