//! Linux keyutils syscalls behind [`KeyBackend`].
//!
//! This is the only module that issues raw syscalls. Pointers handed to the
//! kernel always come from a live `CString` or a buffer whose length is passed
//! alongside it.

#![allow(unsafe_code)]

use super::backend::{KeyBackend, KeySerial, KeyType, SpecialKeyring};
use crate::constants;
use libc::{c_int, c_long, c_ulong, c_void};
use nix::errno::Errno;
use std::ffi::CString;
use std::fs;
use std::ptr;
use std::time::Duration;

const KEYCTL_GET_KEYRING_ID: c_int = 0;
const KEYCTL_REVOKE: c_int = 3;
const KEYCTL_DESCRIBE: c_int = 6;
const KEYCTL_CLEAR: c_int = 7;
const KEYCTL_LINK: c_int = 8;
const KEYCTL_UNLINK: c_int = 9;
const KEYCTL_SEARCH: c_int = 10;
const KEYCTL_READ: c_int = 11;
const KEYCTL_SET_TIMEOUT: c_int = 15;
const KEYCTL_INVALIDATE: c_int = 21;
const KEYCTL_GET_PERSISTENT: c_int = 22;

/// Facility backed by the running kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelBackend;

impl KernelBackend {
    pub fn new() -> Self {
        Self
    }
}

fn keyctl(cmd: c_int, arg2: c_ulong, arg3: c_ulong, arg4: c_ulong, arg5: c_ulong) -> Result<c_long, Errno> {
    // SAFETY: keyctl validates every argument; pointer arguments are only
    // passed by callers in this module and outlive the call.
    let ret = unsafe { libc::syscall(libc::SYS_keyctl, cmd, arg2, arg3, arg4, arg5) };
    Errno::result(ret)
}

fn serial_arg(serial: KeySerial) -> c_ulong {
    serial as c_ulong
}

fn cstring(s: &str) -> Result<CString, Errno> {
    CString::new(s).map_err(|_| Errno::EINVAL)
}

/// Timeout column of `serial` in a `/proc/keys` listing.
///
/// The kernel prints `perm`, `expd`, or the time left in its largest whole
/// unit (`45s`, `12m`, `3h`, `2d`, `1w`), so the result is only as precise
/// as that unit.
fn proc_keys_timeout(listing: &str, serial: KeySerial) -> Option<Option<Duration>> {
    let wanted = format!("{:08x}", serial);
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        if fields.next()? != wanted {
            return None;
        }
        // flags, usage, timeout
        parse_timeout(fields.nth(2)?)
    })
}

fn parse_timeout(field: &str) -> Option<Option<Duration>> {
    match field {
        "perm" => Some(None),
        "expd" => Some(Some(Duration::ZERO)),
        _ => {
            let unit = field.chars().last()?;
            let count: u64 = field[..field.len() - unit.len_utf8()].parse().ok()?;
            let scale = match unit {
                's' => 1,
                'm' => 60,
                'h' => 60 * 60,
                'd' => 24 * 60 * 60,
                'w' => 7 * 24 * 60 * 60,
                _ => return None,
            };
            Some(Some(Duration::from_secs(count.saturating_mul(scale))))
        }
    }
}

impl KernelBackend {
    /// Run a size-query-then-fill keyctl command, retrying if the object grew.
    fn read_sized(&self, cmd: c_int, serial: KeySerial) -> Result<Vec<u8>, Errno> {
        let mut len = keyctl(cmd, serial_arg(serial), 0, 0, 0)? as usize;
        loop {
            let mut buf = vec![0u8; len];
            let ret = keyctl(
                cmd,
                serial_arg(serial),
                buf.as_mut_ptr() as c_ulong,
                len as c_ulong,
                0,
            )? as usize;
            if ret <= len {
                buf.truncate(ret);
                return Ok(buf);
            }
            len = ret;
        }
    }
}

impl KeyBackend for KernelBackend {
    fn add_key(
        &self,
        key_type: KeyType,
        description: &str,
        payload: &[u8],
        keyring: KeySerial,
    ) -> Result<KeySerial, Errno> {
        let ty = cstring(key_type.as_str())?;
        let desc = cstring(description)?;
        let data: *const c_void = if payload.is_empty() {
            ptr::null()
        } else {
            payload.as_ptr().cast()
        };
        // SAFETY: `ty` and `desc` are NUL-terminated and alive for the call;
        // `data` is null or points at `payload.len()` readable bytes.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_add_key,
                ty.as_ptr(),
                desc.as_ptr(),
                data,
                payload.len(),
                keyring as c_long,
            )
        };
        Errno::result(ret).map(|serial| serial as KeySerial)
    }

    fn search(
        &self,
        keyring: KeySerial,
        key_type: KeyType,
        description: &str,
    ) -> Result<KeySerial, Errno> {
        let ty = cstring(key_type.as_str())?;
        let desc = cstring(description)?;
        keyctl(
            KEYCTL_SEARCH,
            serial_arg(keyring),
            ty.as_ptr() as c_ulong,
            desc.as_ptr() as c_ulong,
            0,
        )
        .map(|serial| serial as KeySerial)
    }

    fn request_key(&self, key_type: KeyType, description: &str) -> Result<KeySerial, Errno> {
        let ty = cstring(key_type.as_str())?;
        let desc = cstring(description)?;
        // SAFETY: both strings are NUL-terminated; no callout info is passed.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_request_key,
                ty.as_ptr(),
                desc.as_ptr(),
                ptr::null::<libc::c_char>(),
                0 as c_long,
            )
        };
        Errno::result(ret).map(|serial| serial as KeySerial)
    }

    fn describe(&self, serial: KeySerial) -> Result<String, Errno> {
        let mut buf = self.read_sized(KEYCTL_DESCRIBE, serial)?;
        while buf.last() == Some(&0) {
            buf.pop();
        }
        String::from_utf8(buf).map_err(|_| Errno::EINVAL)
    }

    fn read(&self, serial: KeySerial) -> Result<Vec<u8>, Errno> {
        self.read_sized(KEYCTL_READ, serial)
    }

    fn payload_len(&self, serial: KeySerial) -> Result<usize, Errno> {
        keyctl(KEYCTL_READ, serial_arg(serial), 0, 0, 0).map(|len| len as usize)
    }

    fn expiry(&self, serial: KeySerial) -> Result<Option<Duration>, Errno> {
        let listing = fs::read_to_string(constants::PROC_KEYS_PATH)
            .map_err(|e| e.raw_os_error().map_or(Errno::EIO, Errno::from_raw))?;
        proc_keys_timeout(&listing, serial).ok_or(Errno::ENOKEY)
    }

    fn set_timeout(&self, serial: KeySerial, seconds: u32) -> Result<(), Errno> {
        keyctl(KEYCTL_SET_TIMEOUT, serial_arg(serial), seconds as c_ulong, 0, 0).map(drop)
    }

    fn revoke(&self, serial: KeySerial) -> Result<(), Errno> {
        keyctl(KEYCTL_REVOKE, serial_arg(serial), 0, 0, 0).map(drop)
    }

    fn invalidate(&self, serial: KeySerial) -> Result<(), Errno> {
        keyctl(KEYCTL_INVALIDATE, serial_arg(serial), 0, 0, 0).map(drop)
    }

    fn clear(&self, keyring: KeySerial) -> Result<(), Errno> {
        keyctl(KEYCTL_CLEAR, serial_arg(keyring), 0, 0, 0).map(drop)
    }

    fn link(&self, serial: KeySerial, keyring: KeySerial) -> Result<(), Errno> {
        keyctl(KEYCTL_LINK, serial_arg(serial), serial_arg(keyring), 0, 0).map(drop)
    }

    fn unlink(&self, serial: KeySerial, keyring: KeySerial) -> Result<(), Errno> {
        keyctl(KEYCTL_UNLINK, serial_arg(serial), serial_arg(keyring), 0, 0).map(drop)
    }

    fn persistent_keyring(&self, uid: Option<u32>) -> Result<KeySerial, Errno> {
        // (uid_t)-1 selects the caller's own uid.
        let uid = uid.unwrap_or(u32::MAX);
        keyctl(
            KEYCTL_GET_PERSISTENT,
            uid as c_ulong,
            serial_arg(SpecialKeyring::Process.id()),
            0,
            0,
        )
        .map(|serial| serial as KeySerial)
    }

    fn special_keyring(&self, id: SpecialKeyring, create: bool) -> Result<KeySerial, Errno> {
        keyctl(
            KEYCTL_GET_KEYRING_ID,
            serial_arg(id.id()),
            c_ulong::from(create),
            0,
            0,
        )
        .map(|serial| serial as KeySerial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
0b2ef2b4 I--Q---     1 perm 3f010000     0     0 user      1001: 124
1e4a9c07 I--Q---     1  45s 3f010000     0     0 user      1002: 124
23f1c5d0 I--Q---     2   3h 3f010000     0     0 keyring   API_KEYS: 2
2f00a001 I--Q---     1 expd 3f010000     0     0 user      1003: 124
";

    #[test]
    fn test_parse_timeout_units() {
        assert_eq!(parse_timeout("perm"), Some(None));
        assert_eq!(parse_timeout("expd"), Some(Some(Duration::ZERO)));
        assert_eq!(parse_timeout("12m"), Some(Some(Duration::from_secs(720))));
        assert_eq!(parse_timeout("1w"), Some(Some(Duration::from_secs(604_800))));
        assert_eq!(parse_timeout("5y"), None);
        assert_eq!(parse_timeout(""), None);
    }

    #[test]
    fn test_proc_keys_lookup() {
        assert_eq!(proc_keys_timeout(LISTING, 0x0b2e_f2b4), Some(None));
        assert_eq!(proc_keys_timeout(LISTING, 0x1e4a_9c07), Some(Some(Duration::from_secs(45))));
        assert_eq!(
            proc_keys_timeout(LISTING, 0x23f1_c5d0),
            Some(Some(Duration::from_secs(3 * 3600)))
        );
        assert_eq!(proc_keys_timeout(LISTING, 0x2f00_a001), Some(Some(Duration::ZERO)));
        assert_eq!(proc_keys_timeout(LISTING, 0x1234), None);
    }
}
