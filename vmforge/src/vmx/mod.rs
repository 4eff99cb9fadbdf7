//! Hardware descriptor synthesis.
//!
//! ```text
//! config + iso path + network ──→ VmxTemplateData
//! placement ──→ per-disk fragments ──→ appended to base template text
//! composed template + data ──→ rendered text ──→ VmxDocument ──→ post rules
//! ```
//!
//! Post rules handle properties that are easier to drop than to template
//! conditionally: an unset CPU count removes `numvcpus`, a positive core
//! count adds `cpuid.coresPerSocket`, and port fields left empty by the
//! inactive port variants are removed.

mod data;
mod defaults;
mod document;
mod network;
mod placement;
mod template;

pub use data::{DiskTemplateData, ParallelFields, SerialFields, VmxTemplateData};
pub use defaults::{DEFAULT_DISK_TEMPLATE, DEFAULT_VMX_TEMPLATE};
pub use document::VmxDocument;
pub use network::{CUSTOM_CONNECTION, NetworkSelection, resolve_network};
pub use placement::{DevicePlacement, DiskSlot, RESERVED_UNIT};
pub use template::Template;

use crate::config::BuildConfig;
use crate::driver::NetworkMapper;
use std::path::Path;
use vmforge_shared::constants::vmx_keys;
use vmforge_shared::errors::VmforgeResult;

/// Base and per-disk templates for one build.
#[derive(Debug, Clone)]
pub struct DescriptorTemplates {
    pub base: Template,
    pub disk: Template,
}

impl DescriptorTemplates {
    /// Built-in templates, or the configured override files.
    pub fn load(config: &BuildConfig) -> VmforgeResult<Self> {
        let base = match config.vmx_template_path {
            Some(ref path) => Template::from_file(path)?,
            None => Template::parse("default vmx template", DEFAULT_VMX_TEMPLATE)?,
        };
        let disk = match config.vmx_disk_template_path {
            Some(ref path) => Template::from_file(path)?,
            None => Template::parse("default disk template", DEFAULT_DISK_TEMPLATE)?,
        };
        Ok(Self { base, disk })
    }
}

/// Synthesized descriptor plus the facts later steps need.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub document: VmxDocument,
    pub network: NetworkSelection,
    pub placement: DevicePlacement,
}

impl Descriptor {
    /// Device key of the install-medium CD-ROM.
    pub fn cdrom_device(&self) -> String {
        self.placement.cdrom_device()
    }
}

pub struct DescriptorSynthesizer<'a> {
    config: &'a BuildConfig,
    templates: DescriptorTemplates,
}

impl<'a> DescriptorSynthesizer<'a> {
    pub fn new(config: &'a BuildConfig) -> VmforgeResult<Self> {
        Ok(Self {
            config,
            templates: DescriptorTemplates::load(config)?,
        })
    }

    /// Compose the per-disk fragments into the base template and render it.
    pub fn render_text(
        &self,
        iso_path: &Path,
        network: &NetworkSelection,
        placement: &DevicePlacement,
    ) -> VmforgeResult<String> {
        let mut composed = self.templates.base.clone();
        for slot in &placement.additional {
            tracing::trace!(
                unit = slot.unit,
                disk_number = slot.disk_number,
                past_reserved = slot.past_reserved,
                "Placing additional disk"
            );
            let disk_data = DiskTemplateData::new(placement.disk_bus, &self.config.disk_name, slot);
            let fragment = self.templates.disk.render(&disk_data)?;
            composed = composed.append(&fragment)?;
        }

        let data = VmxTemplateData::new(
            self.config,
            iso_path,
            network,
            placement,
            &self.config.serial_port()?,
            &self.config.parallel_port()?,
        );
        composed.render(&data)
    }

    pub fn synthesize(
        &self,
        iso_path: &Path,
        mapper: Option<&dyn NetworkMapper>,
    ) -> VmforgeResult<Descriptor> {
        let network = resolve_network(self.config.network_name(), mapper);
        let placement = self.config.placement();
        let text = self.render_text(iso_path, &network, &placement)?;

        let mut document = VmxDocument::parse(&text)?;
        apply_post_rules(&mut document, self.config);

        tracing::debug!(
            vm_name = %self.config.vm_name,
            keys = document.len(),
            additional_disks = placement.additional.len(),
            network_type = %network.connection_type,
            "Synthesized hardware descriptor"
        );

        Ok(Descriptor {
            document,
            network,
            placement,
        })
    }
}

fn apply_post_rules(document: &mut VmxDocument, config: &BuildConfig) {
    if config.cpus.is_none() {
        document.remove(vmx_keys::NUM_VCPUS);
    }
    if let Some(cores) = config.cores
        && cores > 0
    {
        document.set(vmx_keys::CORES_PER_SOCKET, cores.to_string());
    }
    document.remove_empty_under(vmx_keys::SERIAL_PREFIX);
    document.remove_empty_under(vmx_keys::PARALLEL_PREFIX);
}
