//! Records bound into descriptor templates.

use super::network::NetworkSelection;
use super::placement::{DevicePlacement, DiskSlot};
use crate::config::{
    BuildConfig, BusType, ParallelPort, PipeEndpoint, PipeFarEnd, SerialPort,
};
use serde::Serialize;
use std::path::Path;

fn flag(value: bool) -> String {
    let text = if value { "TRUE" } else { "FALSE" };
    text.to_string()
}

/// Serial port fields. Fields that do not apply to the active variant are
/// empty and dropped from the document after rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SerialFields {
    pub serial_present: bool,
    pub serial_type: String,
    pub serial_filename: String,
    pub serial_endpoint: String,
    pub serial_try_no_rx_loss: String,
    pub serial_yield: String,
    pub serial_autodetect: String,
}

impl From<&SerialPort> for SerialFields {
    fn from(port: &SerialPort) -> Self {
        match port {
            SerialPort::None => SerialFields::default(),
            SerialPort::Pipe {
                filename,
                endpoint,
                far_end,
                yield_cpu,
            } => SerialFields {
                serial_present: true,
                serial_type: "pipe".to_string(),
                serial_filename: filename.clone(),
                serial_endpoint: match endpoint {
                    PipeEndpoint::Client => "client",
                    PipeEndpoint::Server => "server",
                }
                .to_string(),
                serial_try_no_rx_loss: flag(*far_end == PipeFarEnd::App),
                serial_yield: flag(*yield_cpu),
                ..Default::default()
            },
            SerialPort::File {
                filename,
                yield_cpu,
            } => SerialFields {
                serial_present: true,
                serial_type: "file".to_string(),
                serial_filename: filename.clone(),
                serial_yield: flag(*yield_cpu),
                ..Default::default()
            },
            SerialPort::Device {
                devicename,
                yield_cpu,
            } => SerialFields {
                serial_present: true,
                serial_type: "device".to_string(),
                serial_filename: devicename.clone(),
                serial_yield: flag(*yield_cpu),
                serial_autodetect: flag(false),
                ..Default::default()
            },
            SerialPort::Auto { yield_cpu } => SerialFields {
                serial_present: true,
                serial_type: "device".to_string(),
                serial_yield: flag(*yield_cpu),
                serial_autodetect: flag(true),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParallelFields {
    pub parallel_present: bool,
    pub parallel_type: String,
    pub parallel_filename: String,
    pub parallel_bidirectional: String,
    pub parallel_autodetect: String,
}

impl From<&ParallelPort> for ParallelFields {
    fn from(port: &ParallelPort) -> Self {
        match port {
            ParallelPort::None => ParallelFields::default(),
            ParallelPort::File { filename } => ParallelFields {
                parallel_present: true,
                parallel_type: "file".to_string(),
                parallel_filename: filename.clone(),
                ..Default::default()
            },
            ParallelPort::Device {
                devicename,
                bidirectional,
            } => ParallelFields {
                parallel_present: true,
                parallel_type: "device".to_string(),
                parallel_filename: devicename.clone(),
                parallel_bidirectional: flag(*bidirectional),
                parallel_autodetect: flag(false),
            },
            ParallelPort::Auto { bidirectional } => ParallelFields {
                parallel_present: true,
                parallel_type: "device".to_string(),
                parallel_bidirectional: flag(*bidirectional),
                parallel_autodetect: flag(true),
                ..Default::default()
            },
        }
    }
}

/// Record bound into the base descriptor template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VmxTemplateData {
    pub name: String,
    pub guest_os: String,
    pub version: u32,
    pub iso_path: String,
    pub firmware: String,
    pub secure_boot: bool,
    /// Empty when unset; the key is removed after rendering.
    pub cpus: String,
    pub memory: String,
    pub vhv_enabled: bool,

    pub disk_name: String,
    pub disk_type: String,
    pub scsi_present: bool,
    pub sata_present: bool,
    pub nvme_present: bool,
    pub scsi_adapter: String,
    pub cdrom_type: String,
    pub cdrom_unit: usize,

    pub network_type: String,
    pub network_device: String,
    pub network_adapter: String,

    pub sound_present: bool,
    pub usb_present: bool,
    pub usb_xhci_present: bool,

    #[serde(flatten)]
    pub serial: SerialFields,
    #[serde(flatten)]
    pub parallel: ParallelFields,
}

impl VmxTemplateData {
    pub fn new(
        config: &BuildConfig,
        iso_path: &Path,
        network: &NetworkSelection,
        placement: &DevicePlacement,
        serial: &SerialPort,
        parallel: &ParallelPort,
    ) -> Self {
        let uses = |bus: BusType| placement.disk_bus == bus || placement.cdrom_bus == bus;
        let scsi_adapter = if placement.disk_bus == BusType::Scsi {
            config.disk_adapter_type.as_str()
        } else {
            "lsilogic"
        };

        Self {
            name: config.vm_name.clone(),
            guest_os: config.guest_os_type.clone(),
            version: config.version,
            iso_path: iso_path.display().to_string(),
            firmware: config.firmware.descriptor_value().to_string(),
            secure_boot: config.firmware.secure_boot(),
            cpus: config.cpus.map(|c| c.to_string()).unwrap_or_default(),
            memory: config.memory.to_string(),
            vhv_enabled: config.vhv_enabled,
            disk_name: config.disk_name.clone(),
            disk_type: placement.disk_bus.as_str().to_string(),
            scsi_present: uses(BusType::Scsi),
            sata_present: uses(BusType::Sata),
            nvme_present: uses(BusType::Nvme),
            scsi_adapter: scsi_adapter.to_string(),
            cdrom_type: placement.cdrom_bus.as_str().to_string(),
            cdrom_unit: placement.cdrom_unit,
            network_type: network.connection_type.clone(),
            network_device: network.device.clone(),
            network_adapter: config.network_adapter_type.clone(),
            sound_present: config.sound,
            usb_present: config.usb,
            usb_xhci_present: config.usb_xhci,
            serial: SerialFields::from(serial),
            parallel: ParallelFields::from(parallel),
        }
    }
}

/// Record bound into the per-disk fragment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskTemplateData {
    pub disk_type: String,
    pub disk_unit: usize,
    pub disk_name: String,
    pub disk_number: usize,
}

impl DiskTemplateData {
    pub fn new(bus: BusType, disk_name: &str, slot: &DiskSlot) -> Self {
        Self {
            disk_type: bus.as_str().to_string(),
            disk_unit: slot.unit,
            disk_name: disk_name.to_string(),
            disk_number: slot.disk_number,
        }
    }
}
