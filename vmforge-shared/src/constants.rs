//! Constants shared between the builder and its hosts.

/// Hardware descriptor file extension.
pub const VMX_EXTENSION: &str = "vmx";

/// Log file written by `init_logging_for`.
pub const LOG_FILE_NAME: &str = "vmforge.log";

/// Environment variable consulted for the tracing filter.
pub const LOG_ENV: &str = "RUST_LOG";

/// Hardware descriptor keys the builder manages directly.
pub mod vmx_keys {
    pub const ENCODING: &str = ".encoding";
    pub const DISPLAY_NAME: &str = "displayname";
    pub const NUM_VCPUS: &str = "numvcpus";
    pub const CORES_PER_SOCKET: &str = "cpuid.corespersocket";
    pub const VNC_PREFIX: &str = "remotedisplay.vnc.";
    pub const SERIAL_PREFIX: &str = "serial0.";
    pub const PARALLEL_PREFIX: &str = "parallel0.";
    pub const FLOPPY_PREFIX: &str = "floppy0.";
}
