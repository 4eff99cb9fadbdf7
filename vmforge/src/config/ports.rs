//! Serial and parallel port backings.
//!
//! Configured as strings of the form `KIND:arguments`:
//!
//! ```text
//! serial:   NONE | FILE:path[,yield] | DEVICE:path[,yield] | AUTO[:yield]
//!           PIPE:path,client|server,app|vm[,yield]
//! parallel: NONE | FILE:path | DEVICE:path[,bi] | AUTO[:bi]
//! ```
//!
//! Each port holds exactly one variant.

use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Which end of a named pipe the VM is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEndpoint {
    Client,
    Server,
}

/// What sits on the far side of a named pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeFarEnd {
    App,
    Vm,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SerialPort {
    #[default]
    None,
    Pipe {
        filename: String,
        endpoint: PipeEndpoint,
        far_end: PipeFarEnd,
        yield_cpu: bool,
    },
    File {
        filename: String,
        yield_cpu: bool,
    },
    Device {
        devicename: String,
        yield_cpu: bool,
    },
    Auto {
        yield_cpu: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParallelPort {
    #[default]
    None,
    File {
        filename: String,
    },
    Device {
        devicename: String,
        bidirectional: bool,
    },
    Auto {
        bidirectional: bool,
    },
}

fn split_kind(value: &str) -> (String, Vec<&str>) {
    let (kind, rest) = match value.split_once(':') {
        Some((kind, rest)) => (kind, rest),
        None => (value, ""),
    };
    let args = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',').map(str::trim).collect()
    };
    (kind.trim().to_ascii_uppercase(), args)
}

fn flag(args: &[&str], names: &[&str], port: &str) -> VmforgeResult<bool> {
    match args {
        [] => Ok(false),
        [one] if names.iter().any(|n| one.eq_ignore_ascii_case(n)) => Ok(true),
        [one] if one.eq_ignore_ascii_case("false") => Ok(false),
        [one] if one.eq_ignore_ascii_case("true") => Ok(true),
        _ => Err(VmforgeError::Config(format!(
            "{}: unexpected options {:?}",
            port, args
        ))),
    }
}

fn require_path<'a>(args: &[&'a str], port: &str, kind: &str) -> VmforgeResult<&'a str> {
    match args.first() {
        Some(path) if !path.is_empty() => Ok(*path),
        _ => Err(VmforgeError::Config(format!(
            "{}: {} requires a path",
            port, kind
        ))),
    }
}

impl SerialPort {
    pub fn parse(value: Option<&str>) -> VmforgeResult<Self> {
        let Some(value) = value.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(SerialPort::None);
        };
        let (kind, args) = split_kind(value);
        const YIELD: &[&str] = &["yield"];

        match kind.as_str() {
            "NONE" => Ok(SerialPort::None),
            "FILE" => Ok(SerialPort::File {
                filename: require_path(&args, "serial", "FILE")?.to_string(),
                yield_cpu: flag(&args[1..], YIELD, "serial")?,
            }),
            "DEVICE" => Ok(SerialPort::Device {
                devicename: require_path(&args, "serial", "DEVICE")?.to_string(),
                yield_cpu: flag(&args[1..], YIELD, "serial")?,
            }),
            "AUTO" => Ok(SerialPort::Auto {
                yield_cpu: flag(&args, YIELD, "serial")?,
            }),
            "PIPE" => {
                let filename = require_path(&args, "serial", "PIPE")?.to_string();
                let endpoint = match args.get(1).map(|s| s.to_ascii_lowercase()).as_deref() {
                    Some("client") => PipeEndpoint::Client,
                    Some("server") => PipeEndpoint::Server,
                    other => {
                        return Err(VmforgeError::Config(format!(
                            "serial: PIPE endpoint must be client or server, got {:?}",
                            other
                        )));
                    }
                };
                let far_end = match args.get(2).map(|s| s.to_ascii_lowercase()).as_deref() {
                    Some("app") => PipeFarEnd::App,
                    Some("vm") => PipeFarEnd::Vm,
                    other => {
                        return Err(VmforgeError::Config(format!(
                            "serial: PIPE host must be app or vm, got {:?}",
                            other
                        )));
                    }
                };
                let rest = if args.len() > 3 { &args[3..] } else { &[][..] };
                Ok(SerialPort::Pipe {
                    filename,
                    endpoint,
                    far_end,
                    yield_cpu: flag(rest, YIELD, "serial")?,
                })
            }
            other => Err(VmforgeError::Config(format!(
                "serial: unknown port type '{}'",
                other
            ))),
        }
    }
}

impl ParallelPort {
    pub fn parse(value: Option<&str>) -> VmforgeResult<Self> {
        let Some(value) = value.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(ParallelPort::None);
        };
        let (kind, args) = split_kind(value);
        const BI: &[&str] = &["bi", "bidirectional"];

        match kind.as_str() {
            "NONE" => Ok(ParallelPort::None),
            "FILE" => {
                if args.len() > 1 {
                    return Err(VmforgeError::Config(format!(
                        "parallel: FILE takes only a path, got {:?}",
                        args
                    )));
                }
                Ok(ParallelPort::File {
                    filename: require_path(&args, "parallel", "FILE")?.to_string(),
                })
            }
            "DEVICE" => Ok(ParallelPort::Device {
                devicename: require_path(&args, "parallel", "DEVICE")?.to_string(),
                bidirectional: flag(&args[1..], BI, "parallel")?,
            }),
            "AUTO" => Ok(ParallelPort::Auto {
                bidirectional: flag(&args, BI, "parallel")?,
            }),
            other => Err(VmforgeError::Config(format!(
                "parallel: unknown port type '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_none() {
        assert_eq!(SerialPort::parse(None).unwrap(), SerialPort::None);
        assert_eq!(SerialPort::parse(Some("  ")).unwrap(), SerialPort::None);
        assert_eq!(ParallelPort::parse(None).unwrap(), ParallelPort::None);
    }

    #[test]
    fn test_serial_file_with_yield() {
        let port = SerialPort::parse(Some("file:/tmp/serial.log,yield")).unwrap();
        assert_eq!(
            port,
            SerialPort::File {
                filename: "/tmp/serial.log".into(),
                yield_cpu: true
            }
        );
    }

    #[test]
    fn test_serial_pipe() {
        let port = SerialPort::parse(Some("PIPE:/tmp/com1,server,app")).unwrap();
        assert_eq!(
            port,
            SerialPort::Pipe {
                filename: "/tmp/com1".into(),
                endpoint: PipeEndpoint::Server,
                far_end: PipeFarEnd::App,
                yield_cpu: false,
            }
        );
    }

    #[test]
    fn test_serial_pipe_requires_endpoint() {
        assert!(SerialPort::parse(Some("PIPE:/tmp/com1")).is_err());
        assert!(SerialPort::parse(Some("PIPE:/tmp/com1,both,app")).is_err());
    }

    #[test]
    fn test_serial_auto() {
        assert_eq!(
            SerialPort::parse(Some("AUTO")).unwrap(),
            SerialPort::Auto { yield_cpu: false }
        );
        assert_eq!(
            SerialPort::parse(Some("AUTO:yield")).unwrap(),
            SerialPort::Auto { yield_cpu: true }
        );
    }

    #[test]
    fn test_device_requires_path() {
        assert!(SerialPort::parse(Some("DEVICE:")).is_err());
        assert!(ParallelPort::parse(Some("DEVICE")).is_err());
    }

    #[test]
    fn test_parallel_device_bidirectional() {
        assert_eq!(
            ParallelPort::parse(Some("DEVICE:/dev/parport0,bi")).unwrap(),
            ParallelPort::Device {
                devicename: "/dev/parport0".into(),
                bidirectional: true
            }
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(SerialPort::parse(Some("SOCKET:/tmp/x")).is_err());
        assert!(ParallelPort::parse(Some("PIPE:/tmp/x")).is_err());
    }
}
