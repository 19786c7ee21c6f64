//! System identity (`uname`) records.

use std::fmt;

/// Width of each `struct utsname` field on Linux, terminator included.
pub const UTS_FIELD_LEN: usize = 65;

/// One fixed-width, NUL-terminated identity field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UtsField([u8; UTS_FIELD_LEN]);

impl UtsField {
    /// Copy `value` in, truncated to leave room for the terminator.
    pub fn set(&mut self, value: &[u8]) {
        let len = value.len().min(UTS_FIELD_LEN - 1);
        self.0 = [0; UTS_FIELD_LEN];
        self.0[..len].copy_from_slice(&value[..len]);
    }

    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(UTS_FIELD_LEN);
        &self.0[..end]
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    fn from_c(field: &[libc::c_char]) -> Self {
        let mut out = [0u8; UTS_FIELD_LEN];
        for (dst, &src) in out.iter_mut().zip(field) {
            *dst = src as u8;
        }
        out[UTS_FIELD_LEN - 1] = 0;
        Self(out)
    }

    fn write_c(&self, field: &mut [libc::c_char]) {
        for (dst, &src) in field.iter_mut().zip(self.0.iter()) {
            *dst = src as libc::c_char;
        }
    }
}

impl Default for UtsField {
    fn default() -> Self {
        Self([0; UTS_FIELD_LEN])
    }
}

impl From<&str> for UtsField {
    fn from(value: &str) -> Self {
        let mut field = Self::default();
        field.set(value.as_bytes());
        field
    }
}

impl fmt::Debug for UtsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&String::from_utf8_lossy(self.as_bytes()), f)
    }
}

/// An owned `struct utsname`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtsName {
    pub sysname: UtsField,
    pub nodename: UtsField,
    pub release: UtsField,
    pub version: UtsField,
    pub machine: UtsField,
    pub domainname: UtsField,
}

impl From<&libc::utsname> for UtsName {
    fn from(raw: &libc::utsname) -> Self {
        Self {
            sysname: UtsField::from_c(&raw.sysname),
            nodename: UtsField::from_c(&raw.nodename),
            release: UtsField::from_c(&raw.release),
            version: UtsField::from_c(&raw.version),
            machine: UtsField::from_c(&raw.machine),
            domainname: UtsField::from_c(&raw.domainname),
        }
    }
}

impl UtsName {
    /// Fill a caller-provided `struct utsname`.
    pub fn write_to(&self, raw: &mut libc::utsname) {
        self.sysname.write_c(&mut raw.sysname);
        self.nodename.write_c(&mut raw.nodename);
        self.release.write_c(&mut raw.release);
        self.version.write_c(&mut raw.version);
        self.machine.write_c(&mut raw.machine);
        self.domainname.write_c(&mut raw.domainname);
    }
}
