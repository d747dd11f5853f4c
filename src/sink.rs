//! Printer targets.
//!
//! A target is addressed by a URI:
//!
//! ```text
//! file:///dev/usb/lp0            kernel printer device or any file
//! tcp://192.168.1.20:9100        raw TCP port of a network printer
//! 192.168.1.20:9100              same, scheme omitted
//! usb://04f9:209b/000G0Z123456   USB bulk endpoint, serial number optional
//! usb://209b                     Brother vendor id implied
//! ```

use std::{
    collections::HashMap,
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    net::{Shutdown, TcpStream},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, info, warn};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};

use crate::error::Error;

/// Brother Industries USB vendor id.
pub const BROTHER_VENDOR_ID: u16 = 0x04F9;

const USB_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    File(PathBuf),
    Tcp { host: String, port: u16 },
    Usb {
        vendor: u16,
        product: u16,
        serial: Option<String>,
    },
}

fn bad_target(uri: &str, why: &str) -> Error {
    Error::validation("target", format!("{:?}: {}", uri, why))
}

fn hex_id(uri: &str, id: &str) -> Result<u16, Error> {
    let digits = id.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|_| bad_target(uri, "USB ids are hexadecimal"))
}

fn host_port(uri: &str, address: &str) -> Result<Target, Error> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| bad_target(uri, "expected host:port"))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| bad_target(uri, "invalid port"))?;
    if host.is_empty() {
        return Err(bad_target(uri, "missing host"));
    }
    Ok(Target::Tcp {
        host: host.to_ascii_lowercase(),
        port,
    })
}

impl Target {
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let uri = uri.trim();
        if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(bad_target(uri, "missing path"));
            }
            Ok(Target::File(PathBuf::from(path)))
        } else if let Some(address) = uri.strip_prefix("tcp://") {
            host_port(uri, address)
        } else if let Some(device) = uri.strip_prefix("usb://") {
            let (ids, serial) = match device.split_once('/') {
                Some((ids, serial)) if !serial.is_empty() => (ids, Some(serial.to_string())),
                Some((ids, _)) => (ids, None),
                None => (device, None),
            };
            let (vendor, product) = match ids.split_once(':') {
                Some((vendor, product)) => (hex_id(uri, vendor)?, hex_id(uri, product)?),
                None => (BROTHER_VENDOR_ID, hex_id(uri, ids)?),
            };
            Ok(Target::Usb {
                vendor,
                product,
                serial,
            })
        } else if uri.starts_with('/') {
            Ok(Target::File(PathBuf::from(uri)))
        } else if uri.contains("://") {
            Err(bad_target(uri, "unsupported scheme"))
        } else {
            host_port(uri, uri)
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

/// Canonical form, also used as the lock identity.
impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "file://{}", path.display()),
            Target::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Target::Usb {
                vendor,
                product,
                serial: Some(serial),
            } => write!(f, "usb://{:04x}:{:04x}/{}", vendor, product, serial),
            Target::Usb {
                vendor,
                product,
                serial: None,
            } => write!(f, "usb://{:04x}:{:04x}", vendor, product),
        }
    }
}

fn usb_error(err: rusb::Error) -> io::Error {
    let kind = match err {
        rusb::Error::Timeout => io::ErrorKind::TimedOut,
        rusb::Error::NoDevice | rusb::Error::NotFound => io::ErrorKind::NotFound,
        rusb::Error::Access => io::ErrorKind::PermissionDenied,
        rusb::Error::Busy => io::ErrorKind::WouldBlock,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

struct UsbPrinter {
    handle: DeviceHandle<Context>,
    iface: u8,
    address: u8,
}

impl UsbPrinter {
    fn open(vendor: u16, product: u16, serial: Option<&str>) -> Result<Self, rusb::Error> {
        let mut context = Context::new()?;
        let (device, device_desc, mut handle) =
            Self::open_device(&mut context, vendor, product, serial)?;

        let (iface, address) =
            Self::find_endpoint(&device, &device_desc, Direction::Out, TransferType::Bulk)
                .ok_or(rusb::Error::NotFound)?;

        // QL-800 is bound to usblp, QL-820NWB is not
        handle.set_auto_detach_kernel_driver(true).ok();
        handle.claim_interface(iface)?;
        handle.set_alternate_setting(iface, 0)?;
        debug!(
            "claimed interface {} of {:04x}:{:04x}, bulk out endpoint {:#04x}",
            iface, vendor, product, address
        );

        Ok(UsbPrinter {
            handle,
            iface,
            address,
        })
    }

    fn open_device(
        context: &mut Context,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
    ) -> Result<(Device<Context>, DeviceDescriptor, DeviceHandle<Context>), rusb::Error> {
        for device in context.devices()?.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };
            if device_desc.vendor_id() != vid || device_desc.product_id() != pid {
                continue;
            }
            let handle = match device.open() {
                Ok(handle) => handle,
                Err(err) => {
                    debug!("Failed to open device: {:?}", err);
                    continue;
                }
            };
            let wanted = match serial {
                Some(wanted) => wanted,
                None => return Ok((device, device_desc, handle)),
            };

            let timeout = Duration::from_secs(1);
            let language = match handle.read_languages(timeout)?.first() {
                Some(&language) => language,
                None => continue,
            };
            match handle.read_serial_number_string(language, &device_desc, timeout) {
                Ok(s) if s == wanted => return Ok((device, device_desc, handle)),
                Ok(_) => continue,
                Err(err) => {
                    debug!("Failed to read serial number string: {:?}", err);
                    continue;
                }
            }
        }
        debug!("No device {:04x}:{:04x} with serial {:?}", vid, pid, serial);
        Err(rusb::Error::NoDevice)
    }

    fn find_endpoint(
        device: &Device<Context>,
        device_desc: &DeviceDescriptor,
        direction: Direction,
        transfer_type: TransferType,
    ) -> Option<(u8, u8)> {
        for n in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for interface in config_desc.interfaces() {
                for interface_desc in interface.descriptors() {
                    for endpoint_desc in interface_desc.endpoint_descriptors() {
                        if endpoint_desc.direction() == direction
                            && endpoint_desc.transfer_type() == transfer_type
                        {
                            return Some((
                                interface_desc.interface_number(),
                                endpoint_desc.address(),
                            ));
                        }
                    }
                }
            }
        }
        None
    }

    fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self
                .handle
                .write_bulk(self.address, buf, USB_TIMEOUT)
                .map_err(usb_error)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "printer accepted no bytes",
                ));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}

enum Output {
    File(File),
    Tcp(TcpStream),
    Usb(UsbPrinter),
}

/// An open printer target.
///
/// The target is closed by [`Sink::close`] or when the sink is dropped,
/// whichever comes first.
pub struct Sink {
    target: Target,
    output: Option<Output>,
    written: usize,
}

impl Sink {
    pub fn open(target: &Target) -> Result<Self, Error> {
        let fail = |source: io::Error| Error::SinkWrite {
            target: target.to_string(),
            source,
        };
        let output = match target {
            Target::File(path) => Output::File(
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(fail)?,
            ),
            Target::Tcp { host, port } => {
                Output::Tcp(TcpStream::connect((host.as_str(), *port)).map_err(fail)?)
            }
            Target::Usb {
                vendor,
                product,
                serial,
            } => Output::Usb(
                UsbPrinter::open(*vendor, *product, serial.as_deref())
                    .map_err(|e| fail(usb_error(e)))?,
            ),
        };
        info!("opened printer target {}", target);
        Ok(Sink {
            target: target.clone(),
            output: Some(output),
            written: 0,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let result = match self.output.as_mut() {
            Some(Output::File(file)) => file.write_all(bytes).and_then(|_| file.flush()),
            Some(Output::Tcp(stream)) => stream.write_all(bytes).and_then(|_| stream.flush()),
            Some(Output::Usb(printer)) => printer.write_all(bytes),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "sink is closed")),
        };
        result.map_err(|source| Error::SinkWrite {
            target: self.target.to_string(),
            source,
        })?;
        self.written += bytes.len();
        debug!("wrote {} bytes to {}", bytes.len(), self.target);
        Ok(())
    }

    /// Close the target. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        let result = match self.output.take() {
            None => return Ok(()),
            Some(Output::File(file)) => file.sync_all().or_else(|e| match e.kind() {
                // character devices and pipes cannot be synced
                io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported => Ok(()),
                _ => Err(e),
            }),
            Some(Output::Tcp(stream)) => stream.shutdown(Shutdown::Write).or_else(|e| {
                match e.kind() {
                    io::ErrorKind::NotConnected => Ok(()),
                    _ => Err(e),
                }
            }),
            Some(Output::Usb(mut printer)) => printer
                .handle
                .release_interface(printer.iface)
                .map_err(usb_error),
        };
        debug!("closed {} after {} bytes", self.target, self.written);
        result.map_err(|source| Error::SinkWrite {
            target: self.target.to_string(),
            source,
        })
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("{}", err);
        }
    }
}

/// Resolve `.`, `..` and symlinks, also for a file that does not exist yet.
fn resolved(path: &Path) -> Option<PathBuf> {
    if let Ok(path) = fs::canonicalize(path) {
        return Some(path);
    }
    let parent = fs::canonicalize(path.parent()?).ok()?;
    Some(parent.join(path.file_name()?))
}

/// Lock identity: the canonical form, with file paths resolved.
fn lock_key(target: &Target) -> String {
    match target {
        Target::File(path) => match resolved(path) {
            Some(path) => Target::File(path).to_string(),
            None => target.to_string(),
        },
        _ => target.to_string(),
    }
}

/// One mutex per target, so jobs for the same printer never interleave.
///
/// Locks nobody holds are dropped the next time a lock is taken.
#[derive(Debug, Default)]
pub struct TargetLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TargetLocks {
    fn lock_for(&self, target: &Target) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(lock_key(target)).or_default())
    }

    /// Run `job` while holding the lock of `target`.
    pub fn with<T>(&self, target: &Target, job: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(target);
        let _guard: MutexGuard<'_, ()> = lock.lock().unwrap_or_else(PoisonError::into_inner);
        job()
    }
}
