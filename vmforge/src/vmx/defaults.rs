//! Built-in descriptor templates.

/// Base hardware descriptor.
pub const DEFAULT_VMX_TEMPLATE: &str = r#".encoding = "UTF-8"
bios.bootOrder = "hdd,cdrom"
checkpoint.vmState = ""
cleanShutdown = "TRUE"
config.version = "8"
displayName = "{{ .Name }}"
extendedConfigFile = "{{ .Name }}.vmxf"
nvram = "{{ .Name }}.nvram"
guestOS = "{{ .GuestOs }}"
virtualHW.productCompatibility = "hosted"
virtualHW.version = "{{ .Version }}"
firmware = "{{ .Firmware }}"
uefi.secureBoot.enabled = "{{ .SecureBoot }}"
numvcpus = "{{ .Cpus }}"
memsize = "{{ .Memory }}"
vhv.enable = "{{ .VhvEnabled }}"

gui.fullScreenAtPowerOn = "FALSE"
gui.viewModeAtPowerOn = "windowed"
powerType.powerOff = "soft"
powerType.powerOn = "soft"
powerType.reset = "soft"
powerType.suspend = "soft"
replay.filename = ""
replay.supported = "FALSE"
tools.syncTime = "TRUE"
tools.upgrade.policy = "upgradeAtPowerCycle"
vmci0.present = "TRUE"
hpet0.present = "TRUE"
floppy0.present = "FALSE"

pciBridge0.present = "TRUE"
pciBridge4.present = "TRUE"
pciBridge4.virtualDev = "pcieRootPort"
pciBridge4.functions = "8"
pciBridge5.present = "TRUE"
pciBridge5.virtualDev = "pcieRootPort"
pciBridge5.functions = "8"
pciBridge6.present = "TRUE"
pciBridge6.virtualDev = "pcieRootPort"
pciBridge6.functions = "8"
pciBridge7.present = "TRUE"
pciBridge7.virtualDev = "pcieRootPort"
pciBridge7.functions = "8"

ethernet0.present = "TRUE"
ethernet0.addressType = "generated"
ethernet0.connectionType = "{{ .NetworkType }}"
ethernet0.vnet = "{{ .NetworkDevice }}"
ethernet0.virtualDev = "{{ .NetworkAdapter }}"
ethernet0.displayName = "Ethernet"
ethernet0.linkStatePropagation.enable = "FALSE"
ethernet0.wakeOnPcktRcv = "FALSE"

sound.present = "{{ .SoundPresent }}"
sound.startConnected = "{{ .SoundPresent }}"
sound.autodetect = "TRUE"
sound.fileName = "-1"

usb.present = "{{ .UsbPresent }}"
usb_xhci.present = "{{ .UsbXhciPresent }}"
ehci.present = "{{ .UsbPresent }}"

serial0.present = "{{ .SerialPresent }}"
serial0.startConnected = "{{ .SerialPresent }}"
serial0.fileType = "{{ .SerialType }}"
serial0.fileName = "{{ .SerialFilename }}"
serial0.pipe.endPoint = "{{ .SerialEndpoint }}"
serial0.tryNoRxLoss = "{{ .SerialTryNoRxLoss }}"
serial0.yieldOnMsrRead = "{{ .SerialYield }}"
serial0.autodetect = "{{ .SerialAutodetect }}"

parallel0.present = "{{ .ParallelPresent }}"
parallel0.startConnected = "{{ .ParallelPresent }}"
parallel0.fileType = "{{ .ParallelType }}"
parallel0.fileName = "{{ .ParallelFilename }}"
parallel0.bidirectional = "{{ .ParallelBidirectional }}"
parallel0.autodetect = "{{ .ParallelAutodetect }}"

scsi0.present = "{{ .ScsiPresent }}"
scsi0.virtualDev = "{{ .ScsiAdapter }}"
sata0.present = "{{ .SataPresent }}"
nvme0.present = "{{ .NvmePresent }}"

{{ .DiskType }}0:0.present = "TRUE"
{{ .DiskType }}0:0.fileName = "{{ .DiskName }}.vmdk"
{{ .DiskType }}0:0.redo = ""

{{ .CdromType }}0:{{ .CdromUnit }}.present = "TRUE"
{{ .CdromType }}0:{{ .CdromUnit }}.deviceType = "cdrom-image"
{{ .CdromType }}0:{{ .CdromUnit }}.fileName = "{{ .IsoPath }}"
"#;

/// Fragment appended once per additional disk.
pub const DEFAULT_DISK_TEMPLATE: &str = r#"
{{ .DiskType }}0:{{ .DiskUnit }}.present = "TRUE"
{{ .DiskType }}0:{{ .DiskUnit }}.fileName = "{{ .DiskName }}-{{ .DiskNumber }}.vmdk"
{{ .DiskType }}0:{{ .DiskUnit }}.redo = ""
"#;
