//! Linux bindings for the lock-key collaborators
//!
//! Two devices back the LED subsystem: a uinput virtual keyboard that
//! injects lock-key presses, and the set of evdev nodes we watch for
//! press-downs coming back. The watch set must be assembled after the
//! virtual keyboard exists, otherwise our own injected presses would never
//! be observed and belief would stall.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::mem;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::leds::{Direction, KeyEvent, LockKey, ToggleSource};

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_LED: u32 = 0x11;
const SYN_REPORT: u16 = 0;

const KEY_CAPSLOCK: u16 = 58;
const KEY_NUMLOCK: u16 = 69;
const KEY_SCROLLLOCK: u16 = 70;

const LED_NUML: u8 = 0;
const LED_CAPSL: u8 = 1;
const LED_SCROLLL: u8 = 2;

const BUS_VIRTUAL: u16 = 0x06;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Assemble an ioctl request number (dir | size | type | nr)
const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> libc::c_ulong {
    ((dir << 30) | (size << 16) | (ty << 8) | nr) as libc::c_ulong
}

const UI_DEV_CREATE: libc::c_ulong = ioc(0, b'U' as u32, 1, 0);
const UI_DEV_DESTROY: libc::c_ulong = ioc(0, b'U' as u32, 2, 0);
const UI_DEV_SETUP: libc::c_ulong = ioc(
    IOC_WRITE,
    b'U' as u32,
    3,
    mem::size_of::<UinputSetup>() as u32,
);
const UI_SET_EVBIT: libc::c_ulong = ioc(IOC_WRITE, b'U' as u32, 100, 4);
const UI_SET_KEYBIT: libc::c_ulong = ioc(IOC_WRITE, b'U' as u32, 101, 4);

/// Size of the key-capability bitmap: covers codes up to KEY_MAX (0x2ff)
const KEY_BITS_LEN: usize = 96;

const fn eviocgbit(ev: u32, len: u32) -> libc::c_ulong {
    ioc(IOC_READ, b'E' as u32, 0x20 + ev, len)
}

const fn eviocgled(len: u32) -> libc::c_ulong {
    ioc(IOC_READ, b'E' as u32, 0x19, len)
}

#[repr(C)]
struct InputEvent {
    time: libc::timeval,
    kind: u16,
    code: u16,
    value: i32,
}

#[repr(C)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

#[repr(C)]
struct UinputSetup {
    id: InputId,
    name: [u8; 80],
    ff_effects_max: u32,
}

const EVENT_SIZE: usize = mem::size_of::<InputEvent>();

fn key_code(key: LockKey) -> u16 {
    match key {
        LockKey::NumLock => KEY_NUMLOCK,
        LockKey::CapsLock => KEY_CAPSLOCK,
        LockKey::ScrollLock => KEY_SCROLLLOCK,
    }
}

fn ioctl_arg(file: &File, request: libc::c_ulong, arg: libc::c_int, what: &str) -> AppResult<()> {
    let status = unsafe { libc::ioctl(file.as_raw_fd(), request, arg) };
    if status < 0 {
        return Err(AppError::Led(format!(
            "{} failed: {}",
            what,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn bit_set(bits: &[u8], index: usize) -> bool {
    bits.get(index / 8)
        .map(|byte| byte & (1u8 << (index % 8)) != 0)
        .unwrap_or(false)
}

/// Event nodes under /dev/input, sorted for stable scan order
fn event_nodes() -> AppResult<Vec<PathBuf>> {
    let mut nodes: Vec<PathBuf> = fs::read_dir("/dev/input")
        .map_err(|e| AppError::Led(format!("cannot read /dev/input: {}", e)))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("event"))
                .unwrap_or(false)
        })
        .collect();
    nodes.sort();
    Ok(nodes)
}

/// Does this node expose all three lock keys?
fn has_lock_keys(file: &File) -> bool {
    let mut bits = [0u8; KEY_BITS_LEN];
    let status = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            eviocgbit(EV_KEY as u32, KEY_BITS_LEN as u32),
            bits.as_mut_ptr(),
        )
    };
    status >= 0
        && bit_set(&bits, KEY_NUMLOCK as usize)
        && bit_set(&bits, KEY_CAPSLOCK as usize)
        && bit_set(&bits, KEY_SCROLLLOCK as usize)
}

/// Does this node expose LED state (i.e. is it a real keyboard)?
fn has_leds(file: &File) -> bool {
    let mut bits = [0u8; 4];
    let status = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            eviocgbit(0, bits.len() as u32),
            bits.as_mut_ptr(),
        )
    };
    status >= 0 && bit_set(&bits, EV_LED as usize)
}

/// Virtual keyboard that injects lock-key presses and reads the LED bitmap
/// of a real keyboard for the initial seed.
pub struct UinputLeds {
    device: File,
    keyboard: File,
}

impl UinputLeds {
    pub fn open() -> AppResult<Self> {
        let device = OpenOptions::new()
            .write(true)
            .open("/dev/uinput")
            .map_err(|e| AppError::Led(format!("cannot open /dev/uinput: {}", e)))?;

        ioctl_arg(&device, UI_SET_EVBIT, EV_KEY as libc::c_int, "UI_SET_EVBIT")?;
        for key in LockKey::ALL {
            ioctl_arg(
                &device,
                UI_SET_KEYBIT,
                key_code(key) as libc::c_int,
                "UI_SET_KEYBIT",
            )?;
        }

        let mut setup = UinputSetup {
            id: InputId {
                bustype: BUS_VIRTUAL,
                vendor: 0,
                product: 0,
                version: 0,
            },
            name: [0; 80],
            ff_effects_max: 0,
        };
        let name = b"vusync lock keys";
        setup.name[..name.len()].copy_from_slice(name);

        let status =
            unsafe { libc::ioctl(device.as_raw_fd(), UI_DEV_SETUP, &setup as *const UinputSetup) };
        if status < 0 {
            return Err(AppError::Led(format!(
                "UI_DEV_SETUP failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        ioctl_arg(&device, UI_DEV_CREATE, 0, "UI_DEV_CREATE")?;

        let keyboard = Self::find_keyboard()?;

        Ok(Self { device, keyboard })
    }

    /// First node that looks like a real keyboard: lock keys plus LEDs
    fn find_keyboard() -> AppResult<File> {
        for path in event_nodes()? {
            let Ok(file) = File::open(&path) else {
                continue;
            };
            if has_lock_keys(&file) && has_leds(&file) {
                return Ok(file);
            }
        }
        Err(AppError::Led(
            "no readable keyboard with lock LEDs under /dev/input".to_string(),
        ))
    }

    fn push_event(&mut self, kind: u16, code: u16, value: i32) -> std::io::Result<()> {
        let event = InputEvent {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            kind,
            code,
            value,
        };
        let bytes = unsafe {
            std::slice::from_raw_parts((&event as *const InputEvent).cast::<u8>(), EVENT_SIZE)
        };
        self.device.write_all(bytes)
    }
}

impl crate::leds::LedController for UinputLeds {
    fn read_state(&mut self) -> AppResult<[bool; 3]> {
        let mut leds = [0u8; 8];
        let status = unsafe {
            libc::ioctl(
                self.keyboard.as_raw_fd(),
                eviocgled(leds.len() as u32),
                leds.as_mut_ptr(),
            )
        };
        if status < 0 {
            return Err(AppError::Led(format!(
                "EVIOCGLED failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok([
            bit_set(&leds, LED_NUML as usize),
            bit_set(&leds, LED_CAPSL as usize),
            bit_set(&leds, LED_SCROLLL as usize),
        ])
    }

    fn submit(&mut self, events: &[KeyEvent]) -> AppResult<usize> {
        let mut accepted = 0;
        for &(key, direction) in events {
            let value = match direction {
                Direction::Press => 1,
                Direction::Release => 0,
            };
            if self.push_event(EV_KEY, key_code(key), value).is_err()
                || self.push_event(EV_SYN, SYN_REPORT, 0).is_err()
            {
                break;
            }
            accepted += 1;
        }
        Ok(accepted)
    }
}

impl Drop for UinputLeds {
    fn drop(&mut self) {
        unsafe {
            libc::ioctl(self.device.as_raw_fd(), UI_DEV_DESTROY, 0);
        }
    }
}

/// Watches every lock-key-capable evdev node and yields press-downs of the
/// three lock keys, our own virtual keyboard included.
pub struct EvdevToggleSource {
    devices: Vec<File>,
    pending: VecDeque<LockKey>,
}

impl EvdevToggleSource {
    pub fn open() -> AppResult<Self> {
        let mut devices = Vec::new();
        for path in event_nodes()? {
            let Ok(file) = File::open(&path) else {
                continue;
            };
            if has_lock_keys(&file) {
                devices.push(file);
            }
        }
        if devices.is_empty() {
            return Err(AppError::Led(
                "no readable keyboard event devices under /dev/input".to_string(),
            ));
        }
        Ok(Self {
            devices,
            pending: VecDeque::new(),
        })
    }

    /// Drain readable devices into the pending queue
    fn fill_pending(&mut self) -> bool {
        let mut fds: Vec<libc::pollfd> = self
            .devices
            .iter()
            .map(|device| libc::pollfd {
                fd: device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let status = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if status < 0 {
            return std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted;
        }

        let mut buffer = [0u8; EVENT_SIZE * 32];
        let mut dead = Vec::new();
        for (index, (device, pollfd)) in self.devices.iter_mut().zip(&fds).enumerate() {
            if pollfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                dead.push(index);
                continue;
            }
            if pollfd.revents & libc::POLLIN == 0 {
                continue;
            }
            let Ok(read) = device.read(&mut buffer) else {
                dead.push(index);
                continue;
            };
            for chunk in buffer[..read].chunks_exact(EVENT_SIZE) {
                let event: InputEvent =
                    unsafe { std::ptr::read_unaligned(chunk.as_ptr().cast()) };
                if event.kind != EV_KEY || event.value != 1 {
                    continue;
                }
                let key = match event.code {
                    KEY_NUMLOCK => LockKey::NumLock,
                    KEY_CAPSLOCK => LockKey::CapsLock,
                    KEY_SCROLLLOCK => LockKey::ScrollLock,
                    _ => continue,
                };
                self.pending.push_back(key);
            }
        }

        // Unplugged keyboards leave the watch set; with none left the
        // listener has nothing to observe and ends
        for index in dead.into_iter().rev() {
            self.devices.remove(index);
        }
        !self.devices.is_empty()
    }
}

impl ToggleSource for EvdevToggleSource {
    fn next_press(&mut self) -> Option<LockKey> {
        loop {
            if let Some(key) = self.pending.pop_front() {
                return Some(key);
            }
            if !self.fill_pending() {
                return None;
            }
        }
    }
}

/// Open the controller and the toggle source in the required order: the
/// virtual keyboard first, then the watch set, so the virtual node is part
/// of it. The pause lets the kernel publish the new node.
pub fn open_stack() -> AppResult<(UinputLeds, EvdevToggleSource)> {
    let controller = UinputLeds::open()?;
    std::thread::sleep(Duration::from_millis(200));
    let source = EvdevToggleSource::open()?;
    Ok((controller, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_match_the_kernel_headers() {
        assert_eq!(UI_DEV_CREATE, 0x5501);
        assert_eq!(UI_DEV_DESTROY, 0x5502);
        assert_eq!(UI_SET_EVBIT, 0x4004_5564);
        assert_eq!(UI_SET_KEYBIT, 0x4004_5565);
        assert_eq!(UI_DEV_SETUP, 0x405c_5503);
        assert_eq!(eviocgled(8), 0x8008_4519);
    }

    #[test]
    fn bitmap_probing() {
        let bits = [0b0000_0100u8, 0b0000_0001];
        assert!(bit_set(&bits, 2));
        assert!(bit_set(&bits, 8));
        assert!(!bit_set(&bits, 3));
        assert!(!bit_set(&bits, 64));
    }

    #[test]
    fn uinput_setup_layout_matches_the_abi() {
        assert_eq!(mem::size_of::<UinputSetup>(), 92);
    }
}
