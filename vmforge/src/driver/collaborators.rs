//! Non-hypervisor collaborators and the bundle handed to a build.

use super::{Driver, TracingUi, Ui};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vmforge_shared::errors::VmforgeResult;

/// Fetches and assembles boot media.
#[async_trait]
pub trait MediaStager: Send + Sync {
    /// Download the first reachable URL, verify the checksum, and return
    /// the local path. Must return `Err(Cancelled)` promptly on cancellation.
    async fn download_iso(
        &self,
        urls: &[String],
        checksum: Option<&str>,
        cancel: &CancellationToken,
    ) -> VmforgeResult<PathBuf>;

    /// Build a floppy image holding `files` under `work_dir`.
    async fn create_floppy(&self, files: &[PathBuf], work_dir: &Path) -> VmforgeResult<PathBuf>;

    /// Build an ISO image holding `files` under `work_dir`.
    async fn create_cd(
        &self,
        files: &[PathBuf],
        label: Option<&str>,
        work_dir: &Path,
    ) -> VmforgeResult<PathBuf>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// PEM/OpenSSH private key.
    pub private_key: String,
    /// `authorized_keys` line.
    pub public_key: String,
}

/// Remote command channel to the guest.
#[async_trait]
pub trait Communicator: Send + Sync {
    async fn generate_key_pair(&self) -> VmforgeResult<KeyPair>;

    /// Connect to `host`, retrying internally until connected or cancelled.
    ///
    /// `private_key` is the key file to authenticate with, when the build
    /// has one.
    async fn connect(
        &self,
        host: &str,
        private_key: Option<&Path>,
        cancel: &CancellationToken,
    ) -> VmforgeResult<()>;

    /// Run a command in the guest and return its exit status.
    async fn execute(&self, command: &str) -> VmforgeResult<i32>;

    async fn disconnect(&self) -> VmforgeResult<()>;
}

/// Provisioning run by the plugin host once the guest is reachable.
#[async_trait]
pub trait ProvisionHook: Send + Sync {
    async fn provision(
        &self,
        communicator: &dyn Communicator,
        cancel: &CancellationToken,
    ) -> VmforgeResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VncEndpoint {
    pub address: String,
    pub port: u16,
    pub password: Option<String>,
}

/// Types boot commands into the guest console over VNC.
#[async_trait]
pub trait BootTypist: Send + Sync {
    async fn type_commands(
        &self,
        endpoint: &VncEndpoint,
        commands: &[String],
        cancel: &CancellationToken,
    ) -> VmforgeResult<()>;
}

/// Everything a build needs from its host.
#[derive(Clone)]
pub struct Collaborators {
    pub driver: Arc<dyn Driver>,
    pub stager: Arc<dyn MediaStager>,
    pub communicator: Option<Arc<dyn Communicator>>,
    pub provisioner: Option<Arc<dyn ProvisionHook>>,
    pub typist: Option<Arc<dyn BootTypist>>,
    pub ui: Arc<dyn Ui>,
}

impl Collaborators {
    pub fn new(driver: Arc<dyn Driver>, stager: Arc<dyn MediaStager>) -> Self {
        Self {
            driver,
            stager,
            communicator: None,
            provisioner: None,
            typist: None,
            ui: Arc::new(TracingUi),
        }
    }

    pub fn with_communicator(mut self, communicator: Arc<dyn Communicator>) -> Self {
        self.communicator = Some(communicator);
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn ProvisionHook>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_typist(mut self, typist: Arc<dyn BootTypist>) -> Self {
        self.typist = Some(typist);
        self
    }

    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }
}
