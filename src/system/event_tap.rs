//! Session-level CoreGraphics event tap for `NSSystemDefined` events.
//!
//! Each installed tap runs on its own thread with its own run loop. The sink
//! travels to that thread for as long as the tap is live and is parked in a
//! shared slot again when the thread exits.

use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{CFRunLoop, kCFRunLoopCommonModes, kCFRunLoopDefaultMode};
use core_foundation_sys::mach_port::CFMachPortInvalidate;
use objc2::rc::autoreleasepool;
use objc2::runtime::AnyObject;
use objc2::{Encode, Encoding, class, msg_send};
use std::os::raw::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::keys::ModifierFlags;
use crate::system::traits::{
    EventTapBackend, InstalledTap, TapEvent, TapEventSink, TapInstallFailure, TapVerdict,
};

type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;
type CGEventType = u32;
type CGEventMask = u64;
type CGEventTapCallBack = unsafe extern "C" fn(
    proxy: CGEventTapProxy,
    event_type: CGEventType,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef;

const SESSION_EVENT_TAP: u32 = 1;
const HEAD_INSERT_EVENT_TAP: u32 = 0;
const TAP_OPTION_DEFAULT: u32 = 0;
const EVENT_SYSTEM_DEFINED: CGEventType = 14;
const EVENT_TAP_DISABLED_BY_TIMEOUT: CGEventType = 0xFFFF_FFFE;
const EVENT_TAP_DISABLED_BY_USER_INPUT: CGEventType = 0xFFFF_FFFF;

/// Run loop slice between stop-flag checks
const RUN_SLICE: Duration = Duration::from_millis(250);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(2);

unsafe extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: CGEventMask,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventGetFlags(event: CGEventRef) -> u64;
}

/// `CGEventRef` argument for `+[NSEvent eventWithCGEvent:]`
#[repr(transparent)]
struct CGEventArg(CGEventRef);

unsafe impl Encode for CGEventArg {
    const ENCODING: Encoding = Encoding::Pointer(&Encoding::Struct("__CGEvent", &[]));
}

type SinkSlot = Arc<Mutex<Option<Box<dyn TapEventSink>>>>;

fn lock_slot(slot: &SinkSlot) -> std::sync::MutexGuard<'_, Option<Box<dyn TapEventSink>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

struct TapContext {
    sink: Box<dyn TapEventSink>,
    port: CFMachPortRef,
}

/// Production implementation of EventTapBackend using CGEventTap
#[derive(Debug, Default, Clone, Copy)]
pub struct CGEventTapBackend;

impl CGEventTapBackend {
    pub fn new() -> Self {
        Self
    }
}

impl EventTapBackend for CGEventTapBackend {
    fn install(
        &self,
        sink: Box<dyn TapEventSink>,
    ) -> Result<Box<dyn InstalledTap>, TapInstallFailure> {
        let slot: SinkSlot = Arc::new(Mutex::new(Some(sink)));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_slot = Arc::clone(&slot);
        let thread_stop = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name("media-key-tap".to_string())
            .spawn(move || run_tap(thread_slot, thread_stop, ready_tx));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                return Err(TapInstallFailure {
                    sink: lock_slot(&slot).take(),
                    reason: format!("failed to spawn tap thread: {}", e),
                });
            }
        };

        let failure = match ready_rx.recv_timeout(INSTALL_TIMEOUT) {
            Ok(Ok(())) => {
                info!("Key event tap installed");
                return Ok(Box::new(CGEventTap { stop, handle, slot }));
            }
            Ok(Err(reason)) => reason,
            Err(_) => "tap thread did not report readiness".to_string(),
        };

        stop.store(true, Ordering::Release);
        if handle.join().is_err() {
            error!("Key event tap thread panicked during install");
        }

        Err(TapInstallFailure {
            sink: lock_slot(&slot).take(),
            reason: failure,
        })
    }
}

struct CGEventTap {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    slot: SinkSlot,
}

impl InstalledTap for CGEventTap {
    fn remove(self: Box<Self>) -> Option<Box<dyn TapEventSink>> {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            error!("Key event tap thread panicked");
        }
        info!("Key event tap removed");
        lock_slot(&self.slot).take()
    }
}

fn run_tap(slot: SinkSlot, stop: Arc<AtomicBool>, ready: mpsc::Sender<Result<(), String>>) {
    let Some(sink) = lock_slot(&slot).take() else {
        let _ = ready.send(Err("no event sink to install".to_string()));
        return;
    };

    let mut context = Box::new(TapContext {
        sink,
        port: ptr::null_mut(),
    });

    let port_ref = unsafe {
        CGEventTapCreate(
            SESSION_EVENT_TAP,
            HEAD_INSERT_EVENT_TAP,
            TAP_OPTION_DEFAULT,
            1 << EVENT_SYSTEM_DEFINED,
            tap_callback,
            &mut *context as *mut TapContext as *mut c_void,
        )
    };

    if port_ref.is_null() {
        *lock_slot(&slot) = Some(context.sink);
        let _ = ready.send(Err(
            "CGEventTapCreate returned null (accessibility access missing?)".to_string(),
        ));
        return;
    }

    context.port = port_ref;
    let port = unsafe { CFMachPort::wrap_under_create_rule(port_ref) };

    let source = match port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            unsafe { CFMachPortInvalidate(port_ref) };
            drop(port);
            *lock_slot(&slot) = Some(context.sink);
            let _ = ready.send(Err("failed to create run loop source".to_string()));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
        CGEventTapEnable(port_ref, true);
    }
    let _ = ready.send(Ok(()));
    debug!("Key event tap run loop started");

    while !stop.load(Ordering::Acquire) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_SLICE, false);
        }
    }

    unsafe {
        CGEventTapEnable(port_ref, false);
        run_loop.remove_source(&source, kCFRunLoopCommonModes);
        CFMachPortInvalidate(port_ref);
    }
    drop(source);
    drop(port);

    let TapContext { sink, .. } = *context;
    *lock_slot(&slot) = Some(sink);
    debug!("Key event tap run loop exited");
}

unsafe extern "C" fn tap_callback(
    _proxy: CGEventTapProxy,
    event_type: CGEventType,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    if user_info.is_null() {
        return event;
    }
    let context = unsafe { &mut *(user_info as *mut TapContext) };

    let tap_event = match event_type {
        EVENT_TAP_DISABLED_BY_TIMEOUT => TapEvent::DisabledByTimeout,
        EVENT_TAP_DISABLED_BY_USER_INPUT => TapEvent::DisabledByUserInput,
        EVENT_SYSTEM_DEFINED if !event.is_null() => system_defined_event(event),
        _ => TapEvent::Other,
    };

    let verdict = panic::catch_unwind(AssertUnwindSafe(|| context.sink.on_event(tap_event)))
        .unwrap_or_else(|_| {
            error!("Key event handler panicked, passing event through");
            TapVerdict::PassThrough
        });

    match verdict {
        TapVerdict::PassThrough => event,
        TapVerdict::Consume => ptr::null_mut(),
        TapVerdict::Reenable => {
            if !context.port.is_null() {
                unsafe { CGEventTapEnable(context.port, true) };
            } else {
                warn!("Tap disabled before its port was known");
            }
            event
        }
    }
}

/// Decode subtype and payload through `NSEvent`, the only public accessor for them
fn system_defined_event(event: CGEventRef) -> TapEvent {
    let flags = ModifierFlags::from_bits(unsafe { CGEventGetFlags(event) });

    autoreleasepool(|_| {
        let ns_event: *mut AnyObject =
            unsafe { msg_send![class!(NSEvent), eventWithCGEvent: CGEventArg(event)] };
        if ns_event.is_null() {
            return TapEvent::Other;
        }

        let subtype: i16 = unsafe { msg_send![ns_event, subtype] };
        let data1: isize = unsafe { msg_send![ns_event, data1] };

        TapEvent::SystemDefined {
            subtype,
            data1: data1 as i64,
            flags,
        }
    })
}
