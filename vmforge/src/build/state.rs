//! Shared build state threaded through every step.

use crate::config::BuildConfig;
use crate::driver::{Collaborators, VncEndpoint};
use crate::pipeline::{Signals, StepContext};
use crate::vmx::DevicePlacement;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, TempPath};
use tokio_util::sync::CancellationToken;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Everything steps hand to later steps during one build.
///
/// Outputs start as `None` and are filled by the step that produces them.
/// Readers go through the `require_*` accessors, which report a missing
/// producer as an internal error rather than a user-facing one.
pub struct BuildState {
    /// Unique build identifier (ULID), used to correlate log lines.
    pub build_id: String,
    pub started_at: DateTime<Utc>,
    pub config: Arc<BuildConfig>,
    pub collaborators: Collaborators,
    pub signals: Signals,

    /// Non-fatal messages returned with a successful build.
    pub warnings: Vec<String>,
    /// Devices attached only for the build, detached before export.
    pub temporary_devices: Vec<String>,

    // === Setup ===
    pub output_dir: Option<PathBuf>,
    pub created_output_dir: bool,
    pub ssh_key_file: Option<TempPath>,

    // === Media ===
    pub iso_path: Option<PathBuf>,
    pub floppy_path: Option<PathBuf>,
    pub floppy_dir: Option<TempDir>,
    pub cd_path: Option<PathBuf>,
    pub cd_dir: Option<TempDir>,

    // === Machine ===
    pub disk_paths: Vec<PathBuf>,
    pub placement: Option<DevicePlacement>,
    pub vmx_path: Option<PathBuf>,
    /// Logical network name the descriptor was wired to.
    pub vm_network: Option<String>,
    pub vnc: Option<VncEndpoint>,
    pub registered: bool,
    pub guest_address: Option<String>,
    pub connected: bool,
    pub exported: bool,
}

impl BuildState {
    pub fn new(
        config: Arc<BuildConfig>,
        collaborators: Collaborators,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            build_id: ulid::Ulid::new().to_string(),
            started_at: Utc::now(),
            config,
            collaborators,
            signals: Signals::new(cancel),
            warnings: Vec::new(),
            temporary_devices: Vec::new(),
            output_dir: None,
            created_output_dir: false,
            ssh_key_file: None,
            iso_path: None,
            floppy_path: None,
            floppy_dir: None,
            cd_path: None,
            cd_dir: None,
            disk_paths: Vec::new(),
            placement: None,
            vmx_path: None,
            vm_network: None,
            vnc: None,
            registered: false,
            guest_address: None,
            connected: false,
            exported: false,
        }
    }

    /// Host cancellation token, cloned so it can outlive a borrow of `self`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.signals.cancel_token().clone()
    }

    pub fn vm_name(&self) -> &str {
        &self.config.vm_name
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(vm_name = %self.config.vm_name, "{}", message);
        self.warnings.push(message);
    }

    pub fn require_output_dir(&self) -> VmforgeResult<&Path> {
        require(&self.output_dir, "output_dir").map(PathBuf::as_path)
    }

    pub fn require_iso_path(&self) -> VmforgeResult<&Path> {
        require(&self.iso_path, "download_iso").map(PathBuf::as_path)
    }

    pub fn require_floppy_path(&self) -> VmforgeResult<&Path> {
        require(&self.floppy_path, "create_floppy").map(PathBuf::as_path)
    }

    pub fn require_cd_path(&self) -> VmforgeResult<&Path> {
        require(&self.cd_path, "create_cd").map(PathBuf::as_path)
    }

    pub fn require_vmx_path(&self) -> VmforgeResult<&Path> {
        require(&self.vmx_path, "create_vmx").map(PathBuf::as_path)
    }

    pub fn require_vm_network(&self) -> VmforgeResult<&str> {
        require(&self.vm_network, "create_vmx").map(String::as_str)
    }

    pub fn require_vnc(&self) -> VmforgeResult<&VncEndpoint> {
        require(&self.vnc, "configure_vnc")
    }

    pub fn require_guest_address(&self) -> VmforgeResult<&str> {
        require(&self.guest_address, "connect").map(String::as_str)
    }

    /// Private key the communicator authenticates with, if any.
    pub fn private_key_path(&self) -> Option<&Path> {
        self.config
            .ssh_private_key_file
            .as_deref()
            .or(self.ssh_key_file.as_deref())
    }
}

impl StepContext for BuildState {
    fn signals(&self) -> &Signals {
        &self.signals
    }

    fn signals_mut(&mut self) -> &mut Signals {
        &mut self.signals
    }
}

fn require<'a, T>(value: &'a Option<T>, producer: &str) -> VmforgeResult<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| VmforgeError::Internal(format!("{} step must run first", producer)))
}
