//! Steps: output directory cleanup and export.

use super::{log_step_error, step_start};
use crate::build::BuildState;
use crate::pipeline::{PipelineStep, StepAction};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use vmforge_shared::errors::{VmforgeError, VmforgeResult};
use walkdir::WalkDir;

/// File extensions that make up a finished machine.
const KEEP_EXTENSIONS: &[&str] = &["nvram", "vmdk", "vmsd", "vmx", "vmxf"];

/// Deletes logs, lock files and other runtime leftovers from the output
/// directory.
pub struct CleanFilesStep;

#[async_trait]
impl PipelineStep<BuildState> for CleanFilesStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let output_dir = state.require_output_dir()?.to_path_buf();

        state.collaborators.ui.say("Deleting unnecessary files...");
        let removed = remove_unkept_files(&output_dir)
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;
        for path in &removed {
            state
                .collaborators
                .ui
                .message(&format!("Deleting: {}", path.display()));
        }
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "clean_files"
    }
}

fn is_kept(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| KEEP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn remove_unkept_files(dir: &Path) -> VmforgeResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            VmforgeError::Storage(format!("failed to walk {}: {}", dir.display(), e))
        })?;
        if !entry.file_type().is_file() || is_kept(entry.path()) {
            continue;
        }
        std::fs::remove_file(entry.path())?;
        removed.push(entry.into_path());
    }
    Ok(removed)
}

/// Every file under `dir`, sorted.
pub(crate) fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Exports the finished machine in the configured format.
pub struct ExportStep;

#[async_trait]
impl PipelineStep<BuildState> for ExportStep {
    async fn run(&self, state: &mut BuildState) -> VmforgeResult<StepAction> {
        let step_name = self.name();
        let vm_name = step_start(state, step_name);
        let vmx_path = state.require_vmx_path()?.to_path_buf();
        let output_dir = state.require_output_dir()?.to_path_buf();
        let format = state.config.format.ok_or_else(|| {
            VmforgeError::Internal("export requires a format".to_string())
        })?;

        state
            .collaborators
            .ui
            .say(&format!("Exporting virtual machine as {}...", format.as_str()));
        state
            .collaborators
            .driver
            .export(&vmx_path, &output_dir, format)
            .await
            .inspect_err(|e| log_step_error(&vm_name, step_name, e))?;

        state.exported = true;
        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "export"
    }
}
