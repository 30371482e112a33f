use anyhow::{Context, Result};
use core_foundation::base::TCFType;
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::string::{CFString, CFStringRef};
use std::process::Command;
use tracing::{info, warn};

use crate::system::traits::PermissionChecker;

const ACCESSIBILITY_SETTINGS_URL: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility";

unsafe extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
    static kAXTrustedCheckOptionPrompt: CFStringRef;
}

/// Production implementation of PermissionChecker using the Accessibility API
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessibilityPermissions;

impl AccessibilityPermissions {
    pub fn new() -> Self {
        Self
    }
}

impl PermissionChecker for AccessibilityPermissions {
    fn is_trusted(&self) -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    fn request(&self) -> Result<()> {
        let prompt_key = unsafe { CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt) };
        let options = CFDictionary::from_CFType_pairs(&[(prompt_key, CFBoolean::true_value())]);

        let trusted = unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) };
        if trusted {
            info!("Accessibility permission already granted");
            return Ok(());
        }

        info!("Opening Accessibility settings");
        let status = Command::new("open")
            .arg(ACCESSIBILITY_SETTINGS_URL)
            .status()
            .context("Failed to launch System Settings")?;
        if !status.success() {
            warn!("Opening System Settings exited with {}", status);
        }

        Ok(())
    }
}
