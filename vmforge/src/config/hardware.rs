//! Enumerated hardware choices accepted in configuration.

use serde::{Deserialize, Serialize};

/// Controller bus a device is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    Ide,
    Sata,
    Scsi,
    Nvme,
}

impl BusType {
    /// Descriptor key prefix, e.g. `scsi` in `scsi0:1.fileName`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BusType::Ide => "ide",
            BusType::Sata => "sata",
            BusType::Scsi => "scsi",
            BusType::Nvme => "nvme",
        }
    }

    /// Number of unit positions on the first controller of this bus.
    pub fn unit_capacity(&self) -> usize {
        match self {
            BusType::Ide => 2,
            BusType::Sata => 30,
            BusType::Scsi => 16,
            BusType::Nvme => 15,
        }
    }
}

impl std::fmt::Display for BusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiskAdapter {
    Ide,
    Sata,
    Nvme,
    #[default]
    Lsilogic,
    Lsisas1068,
    Buslogic,
    Pvscsi,
}

impl DiskAdapter {
    pub fn bus(&self) -> BusType {
        match self {
            DiskAdapter::Ide => BusType::Ide,
            DiskAdapter::Sata => BusType::Sata,
            DiskAdapter::Nvme => BusType::Nvme,
            DiskAdapter::Lsilogic
            | DiskAdapter::Lsisas1068
            | DiskAdapter::Buslogic
            | DiskAdapter::Pvscsi => BusType::Scsi,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiskAdapter::Ide => "ide",
            DiskAdapter::Sata => "sata",
            DiskAdapter::Nvme => "nvme",
            DiskAdapter::Lsilogic => "lsilogic",
            DiskAdapter::Lsisas1068 => "lsisas1068",
            DiskAdapter::Buslogic => "buslogic",
            DiskAdapter::Pvscsi => "pvscsi",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdromAdapter {
    Ide,
    Sata,
    Scsi,
}

impl CdromAdapter {
    pub fn bus(&self) -> BusType {
        match self {
            CdromAdapter::Ide => BusType::Ide,
            CdromAdapter::Sata => BusType::Sata,
            CdromAdapter::Scsi => BusType::Scsi,
        }
    }

    /// Adapter used when none is configured.
    pub fn default_for(disk: DiskAdapter) -> Self {
        match disk.bus() {
            BusType::Sata | BusType::Nvme => CdromAdapter::Sata,
            _ => CdromAdapter::Ide,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Firmware {
    #[default]
    Bios,
    Efi,
    EfiSecure,
}

impl Firmware {
    /// Value written to the `firmware` key.
    pub fn descriptor_value(&self) -> &'static str {
        match self {
            Firmware::Bios => "bios",
            Firmware::Efi | Firmware::EfiSecure => "efi",
        }
    }

    pub fn secure_boot(&self) -> bool {
        matches!(self, Firmware::EfiSecure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Ovf,
    Ova,
    Vmx,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Ovf => "ovf",
            ExportFormat::Ova => "ova",
            ExportFormat::Vmx => "vmx",
        }
    }
}

/// Remote-access protocol used to reach the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommunicatorKind {
    None,
    #[default]
    Ssh,
    Winrm,
}
