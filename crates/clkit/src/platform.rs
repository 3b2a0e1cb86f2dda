//! Platform discovery, context creation and device enumeration.

use tracing::{debug, info};

use crate::error::{ClkitError, Result, StatusExt};
use crate::runtime::{DeviceInfo, DeviceType, Runtime};

/// A runtime context bound to one platform and a device-type selection.
///
/// Every program, buffer and queue created from a context borrows it, so a
/// context always outlives the objects built on it. The runtime context is
/// released when this value is dropped.
pub struct Context<'rt, R: Runtime> {
    rt: &'rt R,
    raw: R::Context,
    platform: R::Platform,
    device_type: DeviceType,
}

impl<'rt, R: Runtime> Context<'rt, R> {
    pub fn runtime(&self) -> &'rt R {
        self.rt
    }

    pub fn raw(&self) -> &R::Context {
        &self.raw
    }

    pub fn platform(&self) -> &R::Platform {
        &self.platform
    }

    /// Device-type filter the context was created with.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }
}

impl<R: Runtime> std::fmt::Debug for Context<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("platform", &self.platform)
            .field("device_type", &self.device_type)
            .finish_non_exhaustive()
    }
}

/// All platforms the runtime exposes, in enumeration order. May be empty.
pub fn get_platforms<R: Runtime>(rt: &R) -> Result<Vec<R::Platform>> {
    let platforms = rt.platforms().or_fail(ClkitError::DeviceQueryFailed)?;
    debug!(count = platforms.len(), "platforms enumerated");
    Ok(platforms)
}

/// Vendor string of `platform`.
pub fn get_vendor<R: Runtime>(rt: &R, platform: &R::Platform) -> Result<String> {
    Ok(rt.platform_info(platform).or_fail(ClkitError::DeviceQueryFailed)?.vendor)
}

/// Name string of `platform`.
pub fn get_platform_name<R: Runtime>(rt: &R, platform: &R::Platform) -> Result<String> {
    Ok(rt.platform_info(platform).or_fail(ClkitError::DeviceQueryFailed)?.name)
}

/// Create a context on the first platform of the current enumeration.
///
/// Fails with [`ClkitError::NoPlatformAvailable`] when the runtime reports
/// no platform at all.
pub fn create_context<R: Runtime>(rt: &R, device_type: DeviceType) -> Result<Context<'_, R>> {
    let platforms = get_platforms(rt)?;
    let platform = platforms.into_iter().next().ok_or(ClkitError::NoPlatformAvailable)?;
    create_context_for_platform(rt, platform, device_type)
}

/// [`create_context`] over every device type.
pub fn create_default_context<R: Runtime>(rt: &R) -> Result<Context<'_, R>> {
    create_context(rt, DeviceType::ALL)
}

/// Create a context on `platform` for the devices matching `device_type`.
pub fn create_context_for_platform<R: Runtime>(
    rt: &R,
    platform: R::Platform,
    device_type: DeviceType,
) -> Result<Context<'_, R>> {
    let raw = rt
        .create_context(&platform, device_type)
        .or_fail(ClkitError::ContextCreationFailed)?;
    info!(?platform, %device_type, "context created");
    Ok(Context { rt, raw, platform, device_type })
}

/// Devices of `context`, in runtime order. Index 0 is the conventional
/// default device.
pub fn get_devices<R: Runtime>(context: &Context<'_, R>) -> Result<Vec<R::Device>> {
    context.rt.context_devices(&context.raw).or_fail(ClkitError::DeviceQueryFailed)
}

/// Devices of `platform` matching `device_type`. An empty list is not an
/// error.
pub fn get_platform_devices<R: Runtime>(
    rt: &R,
    platform: &R::Platform,
    device_type: DeviceType,
) -> Result<Vec<R::Device>> {
    rt.platform_devices(platform, device_type).or_fail(ClkitError::DeviceQueryFailed)
}

/// Descriptive information about `device`.
pub fn device_info<R: Runtime>(rt: &R, device: &R::Device) -> Result<DeviceInfo> {
    rt.device_info(device).or_fail(ClkitError::DeviceQueryFailed)
}
