//! Steps that create and edit the hardware descriptor.

use super::{log_step_error, step_start};
use crate::build::BuildState;
use crate::config::BuildConfig;
use crate::driver::VncEndpoint;
use crate::pipeline::{PipelineStep, StepAction};
use crate::vmx::{DescriptorSynthesizer, VmxDocument};
use async_trait::async_trait;
use rand::Rng;
use std::path::{Path, PathBuf};
use vmforge_shared::constants::{VMX_EXTENSION, vmx_keys};
use tokio::net::TcpListener;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Floppy device key recorded in the temporary device list.
const FLOPPY_DEVICE: &str = "floppy0";

fn vmx_path_in(output_dir: &Path, vm_name: &str) -> PathBuf {
    output_dir.join(format!("{}.{}", vm_name, VMX_EXTENSION))
}

/// Synthesizes the descriptor for an install-from-ISO build.
pub struct CreateVmxStep;

#[async_trait]
impl PipelineStep<BuildState> for CreateVmxStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let config = state.config.clone();
        let output_dir = state.require_output_dir()?.to_path_buf();
        let iso_path = state.require_iso_path()?.to_path_buf();

        state.collaborators.ui.say("Building and writing VMX file");
        let descriptor = DescriptorSynthesizer::new(&config)
            .and_then(|synth| {
                synth.synthesize(&iso_path, state.collaborators.driver.network_mapper())
            })
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        let vmx_path = vmx_path_in(&output_dir, &vm_name);
        descriptor
            .document
            .write_file(&vmx_path)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        tracing::info!(
            vm_name = %vm_name,
            vmx = %vmx_path.display(),
            network = %descriptor.network.logical_name,
            "Wrote hardware descriptor"
        );
        state.temporary_devices.push(descriptor.cdrom_device());
        state.vm_network = Some(descriptor.network.logical_name);
        state.placement = Some(descriptor.placement);
        state.vmx_path = Some(vmx_path);
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "create_vmx"
    }
}

/// Clones an existing machine into the output directory.
pub struct CloneVmxStep;

#[async_trait]
impl PipelineStep<BuildState> for CloneVmxStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let config = state.config.clone();
        let output_dir = state.require_output_dir()?.to_path_buf();
        let source = config.source_path.as_deref().ok_or_else(|| {
            VmforgeError::Internal("clone_vmx requires source_path".to_string())
        })?;

        let vmx_path = vmx_path_in(&output_dir, &vm_name);
        state.collaborators.ui.say(&format!(
            "Cloning source VM {} => {}",
            source.display(),
            vmx_path.display()
        ));
        state
            .collaborators
            .driver
            .clone_vmx(source, &vmx_path, &vm_name)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        state.vm_network = Some(config.network_name().to_string());
        state.vmx_path = Some(vmx_path);
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "clone_vmx"
    }
}

/// Attaches staged media, merges user descriptor data, and sets the
/// display name.
pub struct ConfigureVmxStep;

#[async_trait]
impl PipelineStep<BuildState> for ConfigureVmxStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vmx_path = state.require_vmx_path()?.to_path_buf();

        let mut document = VmxDocument::read_file(&vmx_path)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        let collisions = configure_document(state, &mut document);
        for key in collisions {
            state.warn(format!(
                "vmx_data overrides the generated value of '{}'",
                key
            ));
        }

        document
            .write_file(&vmx_path)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "configure_vmx"
    }
}

/// Apply media attachments, `vmx_data` and the display name. Returns the
/// keys whose generated value `vmx_data` replaced.
fn configure_document(state: &mut BuildState, document: &mut VmxDocument) -> Vec<String> {
    let config = state.config.clone();

    if let Some(ref floppy) = state.floppy_path {
        document.set("floppy0.present", "TRUE");
        document.set("floppy0.fileType", "file");
        document.set("floppy0.fileName", floppy.display().to_string());
        document.set("floppy0.clientDevice", "FALSE");
        state.temporary_devices.push(FLOPPY_DEVICE.to_string());
    }

    if let Some(ref cd) = state.cd_path {
        let device = extra_cd_device(&config);
        let controller = device.split(':').next().unwrap_or(&device).to_string();
        document.set(&format!("{}.present", controller), "TRUE");
        document.set(&format!("{}.present", device), "TRUE");
        document.set(&format!("{}.deviceType", device), "cdrom-image");
        document.set(&format!("{}.fileName", device), cd.display().to_string());
        state.temporary_devices.push(device);
    }

    let mut collisions = Vec::new();
    for (key, value) in &config.vmx_data {
        if let Some(existing) = document.get(key)
            && existing != value
        {
            collisions.push(key.clone());
        }
        document.set(key, value.clone());
    }

    let display_name = config
        .display_name
        .clone()
        .unwrap_or_else(|| config.vm_name.clone());
    if config.display_name.is_some() || !document.contains_key(vmx_keys::DISPLAY_NAME) {
        document.set(vmx_keys::DISPLAY_NAME, display_name);
    }

    collisions
}

/// Device for the CD built from `cd_files`: first unit of the second
/// controller on the CD-ROM bus, clear of every disk and the install medium.
fn extra_cd_device(config: &BuildConfig) -> String {
    format!("{}1:0", config.cdrom_adapter().bus())
}

/// Enables the hypervisor's built-in VNC server on a free port.
pub struct ConfigureVncStep;

#[async_trait]
impl PipelineStep<BuildState> for ConfigureVncStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vnc = state.config.vnc.clone();
        let vmx_path = state.require_vmx_path()?.to_path_buf();

        state.collaborators.ui.say("Configuring VNC...");
        let port = find_free_port(&vnc.bind_address, vnc.port_min, vnc.port_max)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        let mut document = VmxDocument::read_file(&vmx_path)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        document.set("remotedisplay.vnc.enabled", "TRUE");
        document.set("remotedisplay.vnc.port", port.to_string());
        document.set("remotedisplay.vnc.ip", vnc.bind_address.clone());
        if let Some(ref password) = vnc.password {
            document.set("remotedisplay.vnc.password", password.clone());
        }
        document
            .write_file(&vmx_path)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        tracing::info!(vm_name = %vm_name, address = %vnc.bind_address, port, "VNC configured");
        state.vnc = Some(VncEndpoint {
            address: vnc.bind_address,
            port,
            password: vnc.password,
        });
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "configure_vnc"
    }
}

/// A free port in `[min, max)` on `address`.
///
/// Probing starts at a random offset within the range and wraps.
async fn find_free_port(address: &str, min: u16, max: u16) -> VmforgeResult<u16> {
    let no_port = || {
        VmforgeError::Network(format!(
            "no free VNC port in {}..{} on {}",
            min, max, address
        ))
    };
    if min >= max {
        return Err(no_port());
    }

    let span = max - min;
    let offset = rand::rng().random_range(0..span);
    for i in 0..span {
        let port = min + ((u32::from(offset) + u32::from(i)) % u32::from(span)) as u16;
        if TcpListener::bind((address, port)).await.is_ok() {
            return Ok(port);
        }
    }
    Err(no_port())
}

/// Detaches build-only devices, strips VNC settings, and applies
/// `vmx_data_post`.
pub struct CleanVmxStep;

#[async_trait]
impl PipelineStep<BuildState> for CleanVmxStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vmx_path = state.require_vmx_path()?.to_path_buf();

        state.collaborators.ui.say("Cleaning VMX prior to finishing up...");
        let mut document = VmxDocument::read_file(&vmx_path)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        for device in &state.temporary_devices {
            detach_device(&mut document, device);
            tracing::debug!(vm_name = %vm_name, device = %device, "Detached temporary device");
        }
        document.remove_prefix(vmx_keys::VNC_PREFIX);
        for (key, value) in &state.config.vmx_data_post {
            document.set(key, value.clone());
        }

        document
            .write_file(&vmx_path)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "clean_vmx"
    }
}

fn detach_device(document: &mut VmxDocument, device: &str) {
    if device == FLOPPY_DEVICE {
        document.remove_prefix(vmx_keys::FLOPPY_PREFIX);
        document.set("floppy0.present", "FALSE");
        return;
    }
    document.set(&format!("{}.deviceType", device), "cdrom-raw");
    document.set(&format!("{}.fileName", device), "auto detect");
    document.set(&format!("{}.clientDevice", device), "TRUE");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::{Recorder, collaborators, iso_config};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn state_with(config: BuildConfig, out: &Path) -> BuildState {
        let recorder = Recorder::new();
        let mut state = BuildState::new(
            Arc::new(config),
            collaborators(&recorder),
            CancellationToken::new(),
        );
        std::fs::create_dir_all(out).unwrap();
        state.output_dir = Some(out.to_path_buf());
        state.iso_path = Some(PathBuf::from("/cache/install.iso"));
        state
    }

    #[tokio::test]
    async fn test_create_vmx_records_outputs() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let mut state = state_with(iso_config(root.path()), &out);

        CreateVmxStep.run(&mut state).await.unwrap();
        let vmx_path = state.require_vmx_path().unwrap().to_path_buf();
        assert_eq!(vmx_path, out.join("test-vm.vmx"));
        assert_eq!(state.temporary_devices, vec!["ide0:0".to_string()]);
        assert_eq!(state.require_vm_network().unwrap(), "nat");

        let document = VmxDocument::read_file(&vmx_path).unwrap();
        assert_eq!(document.get("ide0:0.fileName"), Some("/cache/install.iso"));
        assert_eq!(document.get("ethernet0.connectionType"), Some("nat"));
    }

    #[tokio::test]
    async fn test_create_vmx_requires_iso() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let mut state = state_with(iso_config(root.path()), &out);
        state.iso_path = None;

        let err = CreateVmxStep.run(&mut state).await.unwrap_err();
        assert!(matches!(err, VmforgeError::Internal(ref m) if m.contains("download_iso")));
    }

    #[tokio::test]
    async fn test_configure_attaches_media_and_warns_on_collision() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let mut vmx_data = BTreeMap::new();
        vmx_data.insert("memsize".to_string(), "4096".to_string());
        vmx_data.insert("custom.key".to_string(), "value".to_string());
        let config = BuildConfig {
            vmx_data,
            display_name: Some("Web Server".into()),
            ..iso_config(root.path())
        };
        let mut state = state_with(config, &out);
        CreateVmxStep.run(&mut state).await.unwrap();
        state.floppy_path = Some(PathBuf::from("/tmp/floppy.img"));
        state.cd_path = Some(PathBuf::from("/tmp/cd.iso"));

        ConfigureVmxStep.run(&mut state).await.unwrap();
        let document = VmxDocument::read_file(state.require_vmx_path().unwrap()).unwrap();
        assert_eq!(document.get("memsize"), Some("4096"));
        assert_eq!(document.get("custom.key"), Some("value"));
        assert_eq!(document.get("displayName"), Some("Web Server"));
        assert_eq!(document.get("floppy0.present"), Some("TRUE"));
        assert_eq!(document.get("ide1:0.fileName"), Some("/tmp/cd.iso"));
        assert_eq!(state.warnings.len(), 1);
        assert!(state.warnings[0].contains("memsize"));
        assert_eq!(
            state.temporary_devices,
            vec!["ide0:0".to_string(), "floppy0".to_string(), "ide1:0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_clean_detaches_and_applies_post_data() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let mut vmx_data_post = BTreeMap::new();
        vmx_data_post.insert("ethernet0.virtualDev".to_string(), "vmxnet3".to_string());
        let config = BuildConfig {
            vmx_data_post,
            ..iso_config(root.path())
        };
        let mut state = state_with(config, &out);
        CreateVmxStep.run(&mut state).await.unwrap();
        state.floppy_path = Some(PathBuf::from("/tmp/floppy.img"));
        ConfigureVmxStep.run(&mut state).await.unwrap();

        let vmx_path = state.require_vmx_path().unwrap().to_path_buf();
        let mut document = VmxDocument::read_file(&vmx_path).unwrap();
        document.set("remotedisplay.vnc.port", "5901");
        document.write_file(&vmx_path).unwrap();

        CleanVmxStep.run(&mut state).await.unwrap();
        let document = VmxDocument::read_file(&vmx_path).unwrap();
        assert_eq!(document.get("ide0:0.deviceType"), Some("cdrom-raw"));
        assert_eq!(document.get("ide0:0.fileName"), Some("auto detect"));
        assert_eq!(document.get("floppy0.present"), Some("FALSE"));
        assert!(!document.contains_key("floppy0.fileName"));
        assert!(!document.contains_key("remotedisplay.vnc.port"));
        assert_eq!(document.get("ethernet0.virtualDev"), Some("vmxnet3"));
    }

    #[tokio::test]
    async fn test_configure_vnc_writes_endpoint() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let mut config = iso_config(root.path());
        config.vnc.disable = false;
        config.vnc.port_min = 15900;
        config.vnc.port_max = 16000;
        let mut state = state_with(config, &out);
        CreateVmxStep.run(&mut state).await.unwrap();

        ConfigureVncStep.run(&mut state).await.unwrap();
        let endpoint = state.require_vnc().unwrap().clone();
        assert!((15900..16000).contains(&endpoint.port));

        let document = VmxDocument::read_file(state.require_vmx_path().unwrap()).unwrap();
        assert_eq!(document.get("remotedisplay.vnc.enabled"), Some("TRUE"));
        assert_eq!(
            document.get("remotedisplay.vnc.port"),
            Some(endpoint.port.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_configure_vnc_missing_descriptor_fails() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let mut config = iso_config(root.path());
        config.vnc.disable = false;
        config.vnc.port_min = 16000;
        config.vnc.port_max = 16100;
        let mut state = state_with(config, &out);
        state.vmx_path = Some(out.join("missing.vmx"));

        let err = ConfigureVncStep.run(&mut state).await.unwrap_err();
        assert!(matches!(err, VmforgeError::Descriptor(_)));
        assert!(state.vnc.is_none());
    }

    #[tokio::test]
    async fn test_no_free_port_is_network_error() {
        let err = find_free_port("127.0.0.1", 5900, 5900).await.unwrap_err();
        assert!(matches!(err, VmforgeError::Network(_)));
    }
}
