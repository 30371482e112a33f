use std::time::Duration;

use tokio::sync::watch;
use volume_hud_engine::audio::{StepPolicy, VolumeKeyController};
use volume_hud_engine::events::{EventReceiver, HudEvent, event_channel};
use volume_hud_engine::keys::{KeyEventSink, MediaKey, MediaKeyInterceptor};
use volume_hud_engine::system::{
    MockAudioHardware, MockEventTap, MockPermissions, TapEvent, TapVerdict,
};
use volume_hud_engine::InterceptorError;

mod test_utils;
use test_utils::{DeviceBuilder, KeyEventBuilder};

/// Interceptor wired to mocks the way the engine wires the real tap
struct InterceptorFixture {
    audio: MockAudioHardware,
    tap: MockEventTap,
    permissions: MockPermissions,
    policy_tx: watch::Sender<StepPolicy>,
    events_rx: EventReceiver,
    interceptor: MediaKeyInterceptor<MockEventTap, MockPermissions>,
}

impl InterceptorFixture {
    fn new(permissions: MockPermissions) -> Self {
        let audio = MockAudioHardware::new();
        let tap = MockEventTap::new();
        let (events, events_rx) = event_channel();
        let (policy_tx, policy_rx) = watch::channel(StepPolicy::default());

        let controller = VolumeKeyController::new(audio.clone(), StepPolicy::default());
        let sink = KeyEventSink::new(controller, policy_rx, events);
        let interceptor =
            MediaKeyInterceptor::new(tap.clone(), permissions.clone(), Box::new(sink));

        Self {
            audio,
            tap,
            permissions,
            policy_tx,
            events_rx,
            interceptor,
        }
    }

    fn granted() -> Self {
        Self::new(MockPermissions::granted())
    }
}

/// Routing of raw tap events
#[cfg(test)]
mod event_routing {
    use super::*;

    #[test]
    fn test_volume_keys_are_consumed_and_applied() {
        let mut fixture = InterceptorFixture::granted();
        let device = DeviceBuilder::new(1).volume(0.5).build(&fixture.audio);
        fixture.interceptor.start().unwrap();

        let verdict = fixture.tap.send(KeyEventBuilder::sound_up().build());

        assert_eq!(verdict, Some(TapVerdict::Consume));
        assert_eq!(fixture.audio.volume_of(device), Some(0.5625));
    }

    #[test]
    fn test_key_release_and_brightness_pass_through() {
        let mut fixture = InterceptorFixture::granted();
        DeviceBuilder::new(1).build(&fixture.audio);
        fixture.interceptor.start().unwrap();

        let release = fixture.tap.send(KeyEventBuilder::sound_up().up().build());
        let brightness = fixture
            .tap
            .send(KeyEventBuilder::new(KeyEventBuilder::BRIGHTNESS_UP).build());
        let other_subtype = fixture
            .tap
            .send(KeyEventBuilder::sound_up().subtype(7).build());
        let other_event = fixture.tap.send(TapEvent::Other);

        assert_eq!(release, Some(TapVerdict::PassThrough));
        assert_eq!(brightness, Some(TapVerdict::PassThrough));
        assert_eq!(other_subtype, Some(TapVerdict::PassThrough));
        assert_eq!(other_event, Some(TapVerdict::PassThrough));
        assert_eq!(fixture.audio.write_count(), 0);
    }

    #[test]
    fn test_auto_repeat_keeps_stepping() {
        let mut fixture = InterceptorFixture::granted();
        let device = DeviceBuilder::new(1).volume(0.5).build(&fixture.audio);
        fixture.interceptor.start().unwrap();

        fixture.tap.send(KeyEventBuilder::sound_down().build());
        fixture.tap.send(KeyEventBuilder::sound_down().repeat().build());

        assert_eq!(fixture.audio.volume_of(device), Some(0.375));
    }

    #[test]
    fn test_shift_option_steps_finely() {
        let mut fixture = InterceptorFixture::granted();
        let device = DeviceBuilder::new(1).volume(0.5).build(&fixture.audio);
        fixture.interceptor.start().unwrap();

        fixture.tap.send(KeyEventBuilder::sound_up().fine().build());

        assert_eq!(fixture.audio.volume_of(device), Some(0.515625));
    }

    #[test]
    fn test_limit_reached_sends_key_feedback() {
        let mut fixture = InterceptorFixture::granted();
        DeviceBuilder::new(1).volume(1.0).build(&fixture.audio);
        fixture.interceptor.start().unwrap();

        let verdict = fixture.tap.send(KeyEventBuilder::sound_up().build());

        assert_eq!(verdict, Some(TapVerdict::Consume));
        assert_eq!(
            fixture.events_rx.try_recv().ok(),
            Some(HudEvent::KeyFeedback(MediaKey::SoundUp))
        );
    }

    #[test]
    fn test_no_output_device_passes_key_to_os() {
        let mut fixture = InterceptorFixture::granted();
        fixture.interceptor.start().unwrap();

        let verdict = fixture.tap.send(KeyEventBuilder::mute().build());

        assert_eq!(verdict, Some(TapVerdict::PassThrough));
        assert!(fixture.events_rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_tap_is_reenabled() {
        let mut fixture = InterceptorFixture::granted();
        fixture.interceptor.start().unwrap();

        fixture.tap.send(TapEvent::DisabledByTimeout);
        fixture.tap.send(TapEvent::DisabledByUserInput);

        assert_eq!(fixture.tap.reenable_count(), 2);
    }

    #[test]
    fn test_policy_update_reaches_active_tap() {
        let mut fixture = InterceptorFixture::granted();
        let device = DeviceBuilder::new(1).volume(0.5).build(&fixture.audio);
        fixture.interceptor.start().unwrap();

        fixture
            .policy_tx
            .send_replace(StepPolicy::new(8, 32, 0.25));
        fixture.tap.send(KeyEventBuilder::sound_up().build());

        assert_eq!(fixture.audio.volume_of(device), Some(0.625));
    }
}

/// Start/stop lifecycle
#[cfg(test)]
mod lifecycle {
    use super::*;

    #[test]
    fn test_denied_permission_installs_nothing() {
        let mut fixture = InterceptorFixture::new(MockPermissions::denied());

        let result = fixture.interceptor.start();

        assert!(matches!(result, Err(InterceptorError::PermissionDenied)));
        assert!(!fixture.interceptor.is_active());
        assert_eq!(fixture.tap.install_count(), 0);
    }

    #[test]
    fn test_restart_keeps_last_volume_cache() {
        let mut fixture = InterceptorFixture::granted();
        let device = DeviceBuilder::new(1)
            .volume(0.4)
            .without_mute()
            .build(&fixture.audio);

        fixture.interceptor.start().unwrap();
        fixture.tap.send(KeyEventBuilder::mute().build());
        assert_eq!(fixture.audio.volume_of(device), Some(0.0));

        fixture.interceptor.stop();
        assert!(!fixture.tap.is_installed());
        assert_eq!(fixture.tap.send(KeyEventBuilder::mute().build()), None);

        fixture.interceptor.start().unwrap();
        fixture.tap.send(KeyEventBuilder::mute().build());

        assert_eq!(fixture.audio.volume_of(device), Some(0.4));
        assert_eq!(fixture.tap.install_count(), 2);
    }

    #[test]
    fn test_install_failure_can_be_retried() {
        let mut fixture = InterceptorFixture::granted();
        fixture.tap.set_install_failure(true);

        assert!(matches!(
            fixture.interceptor.start(),
            Err(InterceptorError::TapInstall(_))
        ));

        fixture.tap.set_install_failure(false);
        fixture.interceptor.start().unwrap();
        assert!(fixture.interceptor.is_active());
    }

    #[test]
    fn test_request_permission_delegates_to_checker() {
        let fixture = InterceptorFixture::new(MockPermissions::denied());

        fixture.interceptor.request_permission().unwrap();

        assert_eq!(fixture.permissions.request_count(), 1);
        assert!(!fixture.interceptor.has_permission());
    }
}

/// Accessibility permission polling
#[cfg(test)]
mod permission_poll {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_poll_reports_grant() {
        let mut fixture = InterceptorFixture::new(MockPermissions::denied());
        let (events, mut events_rx) = event_channel();

        // Check 1 is the failed start, checks 2 and 3 come from the poll
        assert!(fixture.interceptor.start().is_err());
        fixture.permissions.grant_after(3);
        fixture
            .interceptor
            .poll_until_granted(Duration::from_millis(100), 10, events)
            .unwrap();
        assert!(fixture.interceptor.is_polling());

        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap();

        assert_eq!(event, Some(HudEvent::PermissionGranted));
        assert_eq!(fixture.permissions.check_count(), 3);

        fixture.interceptor.start().unwrap();
        assert!(fixture.tap.is_installed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_gives_up_after_max_attempts() {
        let mut fixture = InterceptorFixture::new(MockPermissions::denied());
        let (events, mut events_rx) = event_channel();

        fixture
            .interceptor
            .poll_until_granted(Duration::from_millis(100), 3, events)
            .unwrap();

        // The poll task owns the only sender, so the channel closes when it gives up
        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap();

        assert_eq!(event, None);
        assert_eq!(fixture.permissions.check_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_poll_is_rejected() {
        let mut fixture = InterceptorFixture::new(MockPermissions::denied());
        let (events, _events_rx) = event_channel();

        fixture
            .interceptor
            .poll_until_granted(Duration::from_millis(100), 10, events.clone())
            .unwrap();
        let second = fixture
            .interceptor
            .poll_until_granted(Duration::from_millis(100), 10, events);

        assert!(matches!(second, Err(InterceptorError::AlreadyPolling)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_poll() {
        let mut fixture = InterceptorFixture::new(MockPermissions::denied());
        let (events, _events_rx) = event_channel();

        fixture
            .interceptor
            .poll_until_granted(Duration::from_millis(100), 10, events)
            .unwrap();
        fixture.interceptor.stop();

        assert!(!fixture.interceptor.is_polling());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fixture.permissions.check_count(), 0);
    }
}
