use anyhow::Result;
use clkit::{
    ClkitConfig, DeviceInfo, Runtime, device_info, get_platform_devices, get_platform_name,
    get_platforms, get_vendor,
};

/// One enumerated platform with its matching devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformReport {
    pub index: usize,
    pub name: String,
    pub vendor: String,
    pub devices: Vec<DeviceInfo>,
}

/// Enumerate platforms and the devices matching `config.device_type`.
pub fn collect<R: Runtime>(rt: &R, config: &ClkitConfig) -> Result<Vec<PlatformReport>> {
    let mut reports = Vec::new();
    for (index, platform) in get_platforms(rt)?.iter().enumerate() {
        let devices = get_platform_devices(rt, platform, config.device_type)?
            .iter()
            .map(|device| device_info(rt, device))
            .collect::<clkit::Result<Vec<_>>>()?;
        reports.push(PlatformReport {
            index,
            name: get_platform_name(rt, platform)?,
            vendor: get_vendor(rt, platform)?,
            devices,
        });
    }
    Ok(reports)
}

pub fn print(reports: &[PlatformReport]) {
    if reports.is_empty() {
        println!("No platforms found");
        return;
    }
    for report in reports {
        println!("[{}] {} ({})", report.index, report.name, report.vendor);
        if report.devices.is_empty() {
            println!("    no matching devices");
        }
        for (i, device) in report.devices.iter().enumerate() {
            println!("    [{i}] {} - {} ({})", device.name, device.device_type, device.vendor);
        }
    }
}
