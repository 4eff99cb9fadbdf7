//! Steps that drive the machine: registration, power, boot typing,
//! guest connection, provisioning, shutdown.

use super::{cancellable, cancellable_sleep, log_step_error, step_start};
use crate::build::BuildState;
use crate::driver::{Communicator, Driver};
use crate::pipeline::{PipelineStep, StepAction};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Interval between guest address lookups while waiting for the guest.
const GUEST_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Interval between power-state checks while waiting for shutdown.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn communicator(state: &BuildState) -> VmforgeResult<Arc<dyn Communicator>> {
    state
        .collaborators
        .communicator
        .clone()
        .ok_or_else(|| VmforgeError::Internal("no communicator configured".to_string()))
}

pub struct SuppressMessagesStep;

#[async_trait]
impl PipelineStep<BuildState> for SuppressMessagesStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vmx_path = state.require_vmx_path()?.to_path_buf();

        state
            .collaborators
            .driver
            .suppress_messages(&vmx_path)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "suppress_messages"
    }
}

/// Registers the machine with a remote hypervisor.
///
/// Cleanup unregisters it unless the build succeeded with
/// `keep_registered` set.
pub struct RegisterStep;

#[async_trait]
impl PipelineStep<BuildState> for RegisterStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vmx_path = state.require_vmx_path()?.to_path_buf();

        state.collaborators.ui.say("Registering remote VM...");
        state
            .collaborators
            .driver
            .register(&vmx_path)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        state.registered = true;
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        if !state.registered {
            return Ok(());
        }
        if state.config.keep_registered && !state.signals.failed() {
            return Ok(());
        }
        let Some(vmx_path) = state.vmx_path.clone() else {
            return Ok(());
        };
        state.collaborators.ui.say("Unregistering virtual machine...");
        state.collaborators.driver.unregister(&vmx_path).await?;
        state.registered = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "register"
    }
}

/// Powers the machine on. Cleanup powers it off if it is still running.
pub struct RunStep;

#[async_trait]
impl PipelineStep<BuildState> for RunStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vmx_path = state.require_vmx_path()?.to_path_buf();
        let headless = state.config.headless;

        state.collaborators.ui.say("Starting virtual machine...");
        if headless {
            match state.vnc {
                Some(ref vnc) => state.collaborators.ui.message(&format!(
                    "The VM will be run headless, without a GUI. To view it, connect over VNC to {}:{}",
                    vnc.address, vnc.port
                )),
                None => state
                    .collaborators
                    .ui
                    .message("The VM will be run headless, without a GUI."),
            }
        }
        state
            .collaborators
            .driver
            .start(&vmx_path, headless)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        tracing::info!(vm_name = %vm_name, headless, "Virtual machine started");
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        let Some(vmx_path) = state.vmx_path.clone() else {
            return Ok(());
        };
        let driver = &state.collaborators.driver;
        if driver.is_running(&vmx_path).await? {
            state.collaborators.ui.say("Stopping virtual machine...");
            driver.stop(&vmx_path).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "run"
    }
}

/// Waits out `boot_wait`, then types the boot command over VNC.
pub struct TypeBootCommandStep;

#[async_trait]
impl PipelineStep<BuildState> for TypeBootCommandStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let cancel = state.cancel_token();
        let endpoint = state.require_vnc()?.clone();
        let typist = state.collaborators.typist.clone().ok_or_else(|| {
            VmforgeError::Internal("no boot typist configured".to_string())
        })?;

        let wait = Duration::from_secs(state.config.boot_wait_secs);
        if !wait.is_zero() {
            state
                .collaborators
                .ui
                .say(&format!("Waiting {}s for boot...", wait.as_secs()));
            cancellable_sleep(&cancel, wait).await?;
        }

        state
            .collaborators
            .ui
            .say("Typing the boot command over VNC...");
        typist
            .type_commands(&endpoint, &state.config.boot_command, &cancel)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "type_boot_command"
    }
}

/// Waits for the guest to report an address and connects the communicator.
pub struct ConnectStep;

#[async_trait]
impl PipelineStep<BuildState> for ConnectStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let cancel = state.cancel_token();
        let vmx_path = state.require_vmx_path()?.to_path_buf();
        let network = state.require_vm_network()?.to_string();
        let communicator = communicator(state)?;

        state.collaborators.ui.say("Waiting for the guest to obtain an address...");
        let host = wait_for_address(state.collaborators.driver.as_ref(), &vmx_path, &network, &cancel)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        tracing::info!(vm_name = %vm_name, host = %host, "Guest address discovered");
        state.guest_address = Some(host.clone());

        state.collaborators.ui.say(&format!("Connecting to {}...", host));
        communicator
            .connect(&host, state.private_key_path(), &cancel)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        state.connected = true;
        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, state: &mut BuildState) -> VmforgeResult<()> {
        if !state.connected {
            return Ok(());
        }
        communicator(state)?.disconnect().await?;
        state.connected = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "connect"
    }
}

async fn wait_for_address(
    driver: &dyn Driver,
    vmx_path: &Path,
    network: &str,
    cancel: &CancellationToken,
) -> VmforgeResult<String> {
    loop {
        match cancellable(cancel, driver.guest_address(vmx_path, network)).await?? {
            Some(host) if !host.is_empty() => return Ok(host),
            _ => tracing::trace!(network, "Guest has no address yet"),
        }
        cancellable_sleep(cancel, GUEST_POLL_INTERVAL).await?;
    }
}

/// Hands the connected communicator to the host's provisioning hook.
pub struct ProvisionStep;

#[async_trait]
impl PipelineStep<BuildState> for ProvisionStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let cancel = state.cancel_token();

        let Some(provisioner) = state.collaborators.provisioner.clone() else {
            state.collaborators.ui.message("No provisioners configured");
            return Ok(StepAction::Continue);
        };
        let communicator = communicator(state)?;

        state.collaborators.ui.say("Provisioning...");
        provisioner
            .provision(communicator.as_ref(), &cancel)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "provision"
    }
}

/// Shuts the guest down with the configured command, or powers it off.
pub struct ShutdownStep;

#[async_trait]
impl PipelineStep<BuildState> for ShutdownStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let cancel = state.cancel_token();
        let vmx_path = state.require_vmx_path()?.to_path_buf();
        let driver = Arc::clone(&state.collaborators.driver);

        let command = state
            .config
            .shutdown_command
            .clone()
            .filter(|c| !c.is_empty());
        let communicator = state
            .collaborators
            .communicator
            .clone()
            .filter(|_| state.connected);

        match (command, communicator) {
            (Some(command), Some(communicator)) => {
                state.collaborators.ui.say("Gracefully halting virtual machine...");
                let status = communicator
                    .execute(&command)
                    .await
                    .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
                if status != 0 {
                    tracing::warn!(vm_name = %vm_name, status, "Shutdown command exited non-zero");
                }

                let timeout = Duration::from_secs(state.config.shutdown_timeout_secs);
                wait_for_power_off(driver.as_ref(), &vmx_path, timeout, &cancel)
                    .await
                    .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
            }
            _ => {
                state.collaborators.ui.say("Forcibly halting virtual machine...");
                driver
                    .stop(&vmx_path)
                    .await
                    .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
            }
        }

        tracing::info!(vm_name = %vm_name, "Virtual machine shut down");
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "shutdown"
    }
}

async fn wait_for_power_off(
    driver: &dyn Driver,
    vmx_path: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> VmforgeResult<()> {
    let poll = async {
        loop {
            if !driver.is_running(vmx_path).await? {
                return Ok::<(), VmforgeError>(());
            }
            cancellable_sleep(cancel, SHUTDOWN_POLL_INTERVAL).await?;
        }
    };
    tokio::time::timeout(timeout, poll).await.map_err(|_| {
        VmforgeError::Timeout(format!(
            "virtual machine did not shut down within {}s",
            timeout.as_secs()
        ))
    })?
}

/// Unregisters a remote machine at the end of a successful build.
pub struct UnregisterStep;

#[async_trait]
impl PipelineStep<BuildState> for UnregisterStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vmx_path = state.require_vmx_path()?.to_path_buf();

        state.collaborators.ui.say("Unregistering virtual machine...");
        state
            .collaborators
            .driver
            .unregister(&vmx_path)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        state.registered = false;
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "unregister"
    }
}
