//! Contracts for the collaborators a build drives.
//!
//! The builder never talks to the hypervisor, the guest, or the network
//! itself. Hosts supply implementations of these traits:
//!
//! - **Driver**: hypervisor operations (disks, power, registration, export)
//! - **NetworkMapper**: optional name → device lookup a driver may expose
//! - **MediaStager**: ISO download, floppy and CD image assembly
//! - **Communicator**: remote command channel to the guest (SSH/WinRM)
//! - **ProvisionHook**: host-provided provisioning over the communicator
//! - **BootTypist**: keystroke injection over VNC
//! - **Ui**: user-visible progress output

mod collaborators;
mod ui;

pub use collaborators::{
    BootTypist, Collaborators, Communicator, KeyPair, MediaStager, ProvisionHook, VncEndpoint,
};
pub use ui::{TracingUi, Ui};

use crate::config::{DiskAdapter, ExportFormat};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use vmforge_shared::errors::VmforgeResult;

/// Maps logical network names to host network devices.
///
/// Backed by the hypervisor's network configuration on desktop platforms.
pub trait NetworkMapper: Send + Sync {
    /// Devices bound to a logical network name, e.g. `nat` → `["vmnet8"]`.
    fn name_into_devices(&self, name: &str) -> VmforgeResult<Vec<String>>;
}

/// Hypervisor operations used by build steps.
///
/// Paths refer to the machine's descriptor file unless named otherwise.
/// Remote drivers interpret them on the remote host.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Check the hypervisor tooling is installed and usable.
    async fn verify(&self) -> VmforgeResult<()>;

    async fn create_disk(
        &self,
        path: &Path,
        size_mb: u64,
        adapter: DiskAdapter,
        type_id: &str,
    ) -> VmforgeResult<()>;

    /// Clone `source` into `dest` (a descriptor path), copying its disks.
    async fn clone_vmx(&self, source: &Path, dest: &Path, vm_name: &str) -> VmforgeResult<()>;

    async fn register(&self, vmx: &Path) -> VmforgeResult<()>;

    async fn unregister(&self, vmx: &Path) -> VmforgeResult<()>;

    async fn start(&self, vmx: &Path, headless: bool) -> VmforgeResult<()>;

    /// Hard power-off.
    async fn stop(&self, vmx: &Path) -> VmforgeResult<()>;

    async fn is_running(&self, vmx: &Path) -> VmforgeResult<bool>;

    /// Disable interactive hypervisor dialogs for this machine.
    async fn suppress_messages(&self, vmx: &Path) -> VmforgeResult<()>;

    async fn compact_disk(&self, disk: &Path) -> VmforgeResult<()>;

    /// Name-to-device lookup, when the platform has one.
    fn network_mapper(&self) -> Option<&dyn NetworkMapper> {
        None
    }

    /// Address the communicator should connect to, once the guest has one.
    async fn guest_address(&self, vmx: &Path, network: &str) -> VmforgeResult<Option<String>>;

    /// Check the export tool is available before a build relies on it.
    async fn verify_export_tool(&self) -> VmforgeResult<()>;

    async fn export(&self, vmx: &Path, output_dir: &Path, format: ExportFormat)
    -> VmforgeResult<()>;

    /// Upload a local file to `remote_path`. Returns the path the
    /// hypervisor should use for it.
    async fn upload(&self, local: &Path, remote_path: &str) -> VmforgeResult<PathBuf>;
}
