//! CoreAudio implementation of [`AudioHardware`].
//!
//! Listener callbacks are kept in a token-keyed registry. The token, not a
//! pointer, is what CoreAudio hands back to the trampoline, so a notification
//! that races a removal finds nothing and is dropped.

use anyhow::{Result, anyhow};
use coreaudio_sys::*;
use std::collections::HashMap;
use std::mem;
use std::os::raw::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, error, warn};

use crate::audio::{DeviceId, MuteControl, VolumeControl, VolumeElement};
use crate::system::traits::{
    AudioHardware, ListenerCallback, ListenerScope, ListenerToken, PropertyAddress,
    PropertySelector,
};

struct RegisteredListener {
    object: AudioObjectID,
    address: AudioObjectPropertyAddress,
    callback: ListenerCallback,
}

static NEXT_LISTENER_TOKEN: AtomicU64 = AtomicU64::new(1);

fn listener_registry() -> &'static Mutex<HashMap<u64, RegisteredListener>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, RegisteredListener>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Production implementation of AudioHardware using the CoreAudio HAL
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreAudioHardware;

impl CoreAudioHardware {
    pub fn new() -> Self {
        Self
    }
}

fn property(
    selector: AudioObjectPropertySelector,
    scope: AudioObjectPropertyScope,
    element: AudioObjectPropertyElement,
) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: element,
    }
}

fn volume_address(element: VolumeElement) -> AudioObjectPropertyAddress {
    property(
        kAudioDevicePropertyVolumeScalar,
        kAudioObjectPropertyScopeOutput,
        element.raw(),
    )
}

fn mute_address() -> AudioObjectPropertyAddress {
    property(
        kAudioDevicePropertyMute,
        kAudioObjectPropertyScopeOutput,
        kAudioObjectPropertyElementMain,
    )
}

fn native_address(address: PropertyAddress) -> (AudioObjectID, AudioObjectPropertyAddress) {
    let object = match address.scope {
        ListenerScope::System => kAudioObjectSystemObject,
        ListenerScope::Device(device) => device.raw(),
    };

    let native = match address.selector {
        PropertySelector::DefaultOutputDevice => property(
            kAudioHardwarePropertyDefaultOutputDevice,
            kAudioObjectPropertyScopeGlobal,
            kAudioObjectPropertyElementMain,
        ),
        PropertySelector::Volume(element) => volume_address(element),
        PropertySelector::Mute => mute_address(),
        PropertySelector::StreamConfiguration => property(
            kAudioDevicePropertyStreamConfiguration,
            kAudioObjectPropertyScopeOutput,
            kAudioObjectPropertyElementMain,
        ),
        PropertySelector::DeviceIsAlive => property(
            kAudioDevicePropertyDeviceIsAlive,
            kAudioObjectPropertyScopeGlobal,
            kAudioObjectPropertyElementMain,
        ),
    };

    (object, native)
}

fn has_settable_property(object: AudioObjectID, address: &AudioObjectPropertyAddress) -> bool {
    unsafe {
        if AudioObjectHasProperty(object, address) == 0 {
            return false;
        }

        let mut settable: Boolean = 0;
        let status = AudioObjectIsPropertySettable(object, address, &mut settable);
        status == kAudioHardwareNoError as i32 && settable != 0
    }
}

fn read_property<T: Copy + Default>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
) -> Option<T> {
    let mut value = T::default();
    let mut size = mem::size_of::<T>() as UInt32;

    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            &mut size,
            &mut value as *mut T as *mut c_void,
        )
    };

    if status != kAudioHardwareNoError as i32 {
        debug!(
            "Reading property {:#x} of object {} failed: {}",
            address.mSelector, object, status
        );
        return None;
    }

    Some(value)
}

fn write_property<T>(object: AudioObjectID, address: &AudioObjectPropertyAddress, value: &T) -> bool {
    let status = unsafe {
        AudioObjectSetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            mem::size_of::<T>() as UInt32,
            value as *const T as *const c_void,
        )
    };

    if status != kAudioHardwareNoError as i32 {
        warn!(
            "Writing property {:#x} of object {} failed: {}",
            address.mSelector, object, status
        );
        return false;
    }

    true
}

impl AudioHardware for CoreAudioHardware {
    fn default_output_device(&self) -> Option<DeviceId> {
        let address = property(
            kAudioHardwarePropertyDefaultOutputDevice,
            kAudioObjectPropertyScopeGlobal,
            kAudioObjectPropertyElementMain,
        );

        read_property::<AudioDeviceID>(kAudioObjectSystemObject, &address)
            .and_then(DeviceId::from_raw)
    }

    fn resolve_volume_control(&self, device: DeviceId) -> Option<VolumeControl> {
        [VolumeElement::Main, VolumeElement::Channel(1)]
            .into_iter()
            .find(|element| has_settable_property(device.raw(), &volume_address(*element)))
            .map(|element| VolumeControl { element })
    }

    fn resolve_mute_control(&self, device: DeviceId) -> Option<MuteControl> {
        has_settable_property(device.raw(), &mute_address()).then_some(MuteControl)
    }

    fn get_volume(&self, device: DeviceId, control: VolumeControl) -> Option<f32> {
        read_property::<Float32>(device.raw(), &volume_address(control.element))
    }

    fn set_volume(&self, device: DeviceId, control: VolumeControl, volume: f32) -> bool {
        let value: Float32 = volume.clamp(0.0, 1.0);
        write_property(device.raw(), &volume_address(control.element), &value)
    }

    fn get_mute(&self, device: DeviceId, _control: MuteControl) -> Option<bool> {
        read_property::<UInt32>(device.raw(), &mute_address()).map(|muted| muted != 0)
    }

    fn set_mute(&self, device: DeviceId, _control: MuteControl, muted: bool) -> bool {
        let value: UInt32 = muted.into();
        write_property(device.raw(), &mute_address(), &value)
    }

    fn add_listener(
        &self,
        address: PropertyAddress,
        callback: ListenerCallback,
    ) -> Result<ListenerToken> {
        let (object, native) = native_address(address);
        let id = NEXT_LISTENER_TOKEN.fetch_add(1, Ordering::Relaxed);

        // Registered before the HAL knows about it so the first notification resolves
        listener_registry()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                RegisteredListener {
                    object,
                    address: native,
                    callback,
                },
            );

        let status = unsafe {
            AudioObjectAddPropertyListener(
                object,
                &native,
                Some(property_listener),
                id as usize as *mut c_void,
            )
        };

        if status != kAudioHardwareNoError as i32 {
            listener_registry()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            error!("Failed to register listener for {}: {}", address, status);
            return Err(anyhow!(
                "Failed to register listener for {}: OSStatus {}",
                address,
                status
            ));
        }

        debug!("Registered listener {} for {}", id, address);
        Ok(ListenerToken(id))
    }

    fn remove_listener(&self, token: ListenerToken) -> Result<()> {
        let entry = listener_registry()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token.id())
            .ok_or_else(|| anyhow!("Unknown listener token {}", token.id()))?;

        let status = unsafe {
            AudioObjectRemovePropertyListener(
                entry.object,
                &entry.address,
                Some(property_listener),
                token.id() as usize as *mut c_void,
            )
        };

        if status != kAudioHardwareNoError as i32 {
            return Err(anyhow!(
                "Failed to remove listener {}: OSStatus {}",
                token.id(),
                status
            ));
        }

        debug!("Removed listener {}", token.id());
        Ok(())
    }
}

// CoreAudio callback trampoline; `in_client_data` carries the registry token
extern "C" fn property_listener(
    _in_object_id: AudioObjectID,
    _in_number_addresses: UInt32,
    _in_addresses: *const AudioObjectPropertyAddress,
    in_client_data: *mut c_void,
) -> OSStatus {
    let token = in_client_data as usize as u64;
    let callback = listener_registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&token)
        .map(|entry| Arc::clone(&entry.callback));

    if let Some(callback) = callback {
        callback();
    }

    kAudioHardwareNoError as i32
}
