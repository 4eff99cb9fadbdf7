//! Build configuration.
//!
//! `BuildConfig` is deserialized from JSON with defaults for every omitted
//! field, then [`BuildConfig::prepare`] validates it. All problems are
//! collected into one [`VmforgeError::InvalidConfig`] so the user sees the
//! whole list at once; nothing runs until the config is clean.

mod hardware;
mod ports;

pub use hardware::{
    BusType, CdromAdapter, CommunicatorKind, DiskAdapter, ExportFormat, Firmware,
};
pub use ports::{ParallelPort, PipeEndpoint, PipeFarEnd, SerialPort};

use crate::vmx::{DevicePlacement, Template};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Lowest hardware version the descriptor template supports.
pub const MIN_HARDWARE_VERSION: u32 = 13;
pub const DEFAULT_HARDWARE_VERSION: u32 = 19;

/// Which step sequence a build uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildVariant {
    /// Create disks and a descriptor, boot from an install medium.
    Iso,
    /// Clone an existing machine's descriptor and disks.
    Import,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VncConfig {
    pub disable: bool,
    pub port_min: u16,
    pub port_max: u16,
    pub bind_address: String,
    pub password: Option<String>,
}

impl Default for VncConfig {
    fn default() -> Self {
        Self {
            disable: false,
            port_min: 5900,
            port_max: 6000,
            bind_address: "127.0.0.1".to_string(),
            password: None,
        }
    }
}

/// ESXi-style remote host the hypervisor runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    pub datastore: String,
    #[serde(default)]
    pub cache_directory: Option<String>,
}

impl RemoteConfig {
    /// Datastore path an uploaded file lands at.
    pub fn datastore_path(&self, file_name: &str) -> String {
        let dir = self.cache_directory.as_deref().unwrap_or("vmforge_cache");
        format!("/vmfs/volumes/{}/{}/{}", self.datastore, dir, file_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    // === Identity ===
    pub vm_name: String,
    pub display_name: Option<String>,
    pub output_directory: Option<PathBuf>,
    /// Replace an existing non-empty output directory.
    pub force: bool,

    // === Source media ===
    pub iso_urls: Vec<String>,
    pub iso_checksum: Option<String>,
    /// Existing descriptor to clone (import variant).
    pub source_path: Option<PathBuf>,
    pub floppy_files: Vec<PathBuf>,
    pub cd_files: Vec<PathBuf>,
    pub cd_label: Option<String>,

    // === Hardware ===
    pub guest_os_type: String,
    pub version: u32,
    pub firmware: Firmware,
    pub cpus: Option<u32>,
    pub cores: Option<u32>,
    pub memory: u32,
    /// Expose hardware-assisted virtualization to the guest.
    pub vhv_enabled: bool,
    pub usb: bool,
    pub usb_xhci: bool,
    pub sound: bool,
    pub serial: Option<String>,
    pub parallel: Option<String>,

    // === Disks ===
    pub disk_name: String,
    pub disk_size_mb: u64,
    pub disk_type_id: Option<String>,
    pub disk_adapter_type: DiskAdapter,
    pub additional_disk_sizes_mb: Vec<u64>,
    pub cdrom_adapter_type: Option<CdromAdapter>,
    pub skip_compaction: bool,

    // === Network ===
    pub network: Option<String>,
    pub network_adapter_type: String,

    // === Descriptor ===
    pub vmx_template_path: Option<PathBuf>,
    pub vmx_disk_template_path: Option<PathBuf>,
    /// Extra keys merged after synthesis.
    pub vmx_data: BTreeMap<String, String>,
    /// Extra keys merged just before export.
    pub vmx_data_post: BTreeMap<String, String>,

    // === Boot ===
    pub headless: bool,
    pub vnc: VncConfig,
    pub boot_command: Vec<String>,
    pub boot_wait_secs: u64,

    // === Communicator ===
    pub communicator: CommunicatorKind,
    pub ssh_private_key_file: Option<PathBuf>,
    pub shutdown_command: Option<String>,
    pub shutdown_timeout_secs: u64,

    // === Remote & export ===
    pub remote: Option<RemoteConfig>,
    pub keep_registered: bool,
    pub format: Option<ExportFormat>,
    pub skip_export: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            vm_name: "vmforge".to_string(),
            display_name: None,
            output_directory: None,
            force: false,
            iso_urls: Vec::new(),
            iso_checksum: None,
            source_path: None,
            floppy_files: Vec::new(),
            cd_files: Vec::new(),
            cd_label: None,
            guest_os_type: "other".to_string(),
            version: DEFAULT_HARDWARE_VERSION,
            firmware: Firmware::Bios,
            cpus: None,
            cores: None,
            memory: 512,
            vhv_enabled: false,
            usb: false,
            usb_xhci: false,
            sound: false,
            serial: None,
            parallel: None,
            disk_name: "disk".to_string(),
            disk_size_mb: 40_000,
            disk_type_id: None,
            disk_adapter_type: DiskAdapter::Lsilogic,
            additional_disk_sizes_mb: Vec::new(),
            cdrom_adapter_type: None,
            skip_compaction: false,
            network: None,
            network_adapter_type: "e1000".to_string(),
            vmx_template_path: None,
            vmx_disk_template_path: None,
            vmx_data: BTreeMap::new(),
            vmx_data_post: BTreeMap::new(),
            headless: false,
            vnc: VncConfig::default(),
            boot_command: Vec::new(),
            boot_wait_secs: 10,
            communicator: CommunicatorKind::Ssh,
            ssh_private_key_file: None,
            shutdown_command: None,
            shutdown_timeout_secs: 300,
            remote: None,
            keep_registered: false,
            format: None,
            skip_export: false,
        }
    }
}

impl BuildConfig {
    pub fn from_json(text: &str) -> VmforgeResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| VmforgeError::Config(format!("failed to decode configuration: {}", e)))
    }

    pub fn from_file(path: &Path) -> VmforgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VmforgeError::Config(format!(
                "failed to read configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&text)
    }

    pub fn variant(&self) -> BuildVariant {
        if self.source_path.is_some() {
            BuildVariant::Import
        } else {
            BuildVariant::Iso
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("output-{}", self.vm_name)))
    }

    /// `{output_dir}/{vm_name}.vmx`
    pub fn vmx_path(&self) -> PathBuf {
        self.output_dir().join(format!(
            "{}.{}",
            self.vm_name,
            vmforge_shared::constants::VMX_EXTENSION
        ))
    }

    pub fn cdrom_adapter(&self) -> CdromAdapter {
        self.cdrom_adapter_type
            .unwrap_or_else(|| CdromAdapter::default_for(self.disk_adapter_type))
    }

    pub fn network_name(&self) -> &str {
        self.network.as_deref().filter(|n| !n.is_empty()).unwrap_or("nat")
    }

    pub fn disk_type_id(&self) -> &str {
        match (&self.disk_type_id, &self.remote) {
            (Some(id), _) => id,
            (None, Some(_)) => "zeroedthick",
            (None, None) => "1",
        }
    }

    pub fn serial_port(&self) -> VmforgeResult<SerialPort> {
        SerialPort::parse(self.serial.as_deref())
    }

    pub fn parallel_port(&self) -> VmforgeResult<ParallelPort> {
        ParallelPort::parse(self.parallel.as_deref())
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn vnc_enabled(&self) -> bool {
        !self.vnc.disable
    }

    /// Whether the build generates its own SSH key pair.
    pub fn generates_ssh_key(&self) -> bool {
        self.communicator == CommunicatorKind::Ssh && self.ssh_private_key_file.is_none()
    }

    pub fn exports(&self) -> bool {
        self.format.is_some() && !self.skip_export
    }

    /// Device placement for the configured disks and CD-ROM.
    pub fn placement(&self) -> DevicePlacement {
        DevicePlacement::compute(
            self.disk_adapter_type.bus(),
            self.cdrom_adapter().bus(),
            &self.disk_name,
            self.additional_disk_sizes_mb.len(),
        )
    }

    /// Validate the configuration.
    ///
    /// Returns non-fatal warnings on success.
    pub fn prepare(&self) -> VmforgeResult<Vec<String>> {
        let mut errs = Vec::new();
        let mut warnings = Vec::new();

        if self.vm_name.trim().is_empty() {
            errs.push("vm_name must not be empty".to_string());
        }
        if self.vm_name.contains(['/', '\\']) {
            errs.push(format!("vm_name '{}' must not contain path separators", self.vm_name));
        }
        if self.disk_name.trim().is_empty() {
            errs.push("disk_name must not be empty".to_string());
        }
        if self.version < MIN_HARDWARE_VERSION {
            errs.push(format!(
                "hardware version {} is below the minimum {}",
                self.version, MIN_HARDWARE_VERSION
            ));
        }
        if self.memory == 0 {
            errs.push("memory must be positive".to_string());
        }
        if self.cpus == Some(0) {
            errs.push("cpus must be positive when set".to_string());
        }
        if let (Some(cpus), Some(cores)) = (self.cpus, self.cores)
            && cores > 0
            && cpus % cores != 0
        {
            errs.push(format!("cpus ({}) must be a multiple of cores ({})", cpus, cores));
        }

        match self.variant() {
            BuildVariant::Iso => {
                if self.iso_urls.is_empty() {
                    errs.push("iso_urls must list at least one source".to_string());
                }
                if self.disk_size_mb == 0 {
                    errs.push("disk_size_mb must be positive".to_string());
                }
                if self.additional_disk_sizes_mb.contains(&0) {
                    errs.push("additional_disk_sizes_mb entries must be positive".to_string());
                }
                if self.disk_adapter_type == DiskAdapter::Ide
                    && !self.additional_disk_sizes_mb.is_empty()
                {
                    errs.push("additional disks are not supported on the ide adapter".to_string());
                }
                let placement = self.placement();
                let capacity = self.disk_adapter_type.bus().unit_capacity();
                if !placement.fits(capacity) {
                    errs.push(format!(
                        "{} additional disks do not fit on the {} bus ({} units, cdrom on {})",
                        self.additional_disk_sizes_mb.len(),
                        self.disk_adapter_type.bus(),
                        capacity,
                        self.cdrom_adapter().bus()
                    ));
                }
            }
            BuildVariant::Import => {
                if let Some(ref source) = self.source_path
                    && !source.is_file()
                {
                    errs.push(format!("source_path {} is not a readable file", source.display()));
                }
                if !self.iso_urls.is_empty() {
                    warnings.push("iso_urls is ignored when source_path is set".to_string());
                }
            }
        }

        if let Err(e) = self.serial_port() {
            errs.push(e.to_string());
        }
        if let Err(e) = self.parallel_port() {
            errs.push(e.to_string());
        }

        for (label, path) in [
            ("vmx_template_path", &self.vmx_template_path),
            ("vmx_disk_template_path", &self.vmx_disk_template_path),
        ] {
            if let Some(path) = path
                && let Err(e) = Template::from_file(path)
            {
                errs.push(format!("{}: {}", label, e));
            }
        }

        if self.vnc.port_min >= self.vnc.port_max {
            errs.push(format!(
                "vnc port_min ({}) must be less than port_max ({})",
                self.vnc.port_min, self.vnc.port_max
            ));
        }
        if self.vnc.disable && !self.boot_command.is_empty() {
            warnings.push("boot_command is ignored because VNC is disabled".to_string());
        }

        if self.communicator != CommunicatorKind::None
            && self.shutdown_command.as_deref().is_none_or(str::is_empty)
        {
            warnings.push(
                "no shutdown_command set; the VM will be powered off forcibly, \
                 which may corrupt the guest filesystem"
                    .to_string(),
            );
        }
        if self.shutdown_timeout_secs == 0 {
            errs.push("shutdown_timeout_secs must be positive".to_string());
        }
        if let Some(ref key) = self.ssh_private_key_file
            && !key.is_file()
        {
            errs.push(format!("ssh_private_key_file {} does not exist", key.display()));
        }

        if let Some(ref remote) = self.remote {
            if remote.host.is_empty() {
                errs.push("remote.host must not be empty".to_string());
            }
            if remote.datastore.is_empty() {
                errs.push("remote.datastore must not be empty".to_string());
            }
        } else if self.keep_registered {
            warnings.push("keep_registered only applies to remote builds".to_string());
        }
        if self.skip_export && self.format.is_some() {
            warnings.push("format is ignored because skip_export is set".to_string());
        }

        if !errs.is_empty() {
            return Err(VmforgeError::InvalidConfig(errs));
        }

        for warning in &warnings {
            tracing::warn!(vm_name = %self.vm_name, "{}", warning);
        }
        Ok(warnings)
    }
}
