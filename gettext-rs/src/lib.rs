//! Minimal `gettext` bindings used by the posixutils CLI binaries.
//!
//! This mirrors the subset of the real `gettext-rs` crate's public API that
//! the workspace's binaries actually call: locale setup at startup and a
//! `gettext` lookup used (today, as a pass-through) for translatable
//! strings. It shells out to the platform's C library via `libc` rather than
//! linking a bundled `libintl`, since the workspace targets systems where
//! glibc already provides one.

use std::ffi::{CStr, CString};
use std::os::raw::c_int;

/// Selects which `setlocale` category to adjust, matching `<locale.h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleCategory {
    LcAll,
    LcCollate,
    LcCType,
    LcMonetary,
    LcNumeric,
    LcTime,
    LcMessages,
}

impl LocaleCategory {
    fn as_c_int(self) -> c_int {
        match self {
            LocaleCategory::LcAll => libc::LC_ALL,
            LocaleCategory::LcCollate => libc::LC_COLLATE,
            LocaleCategory::LcCType => libc::LC_CTYPE,
            LocaleCategory::LcMonetary => libc::LC_MONETARY,
            LocaleCategory::LcNumeric => libc::LC_NUMERIC,
            LocaleCategory::LcTime => libc::LC_TIME,
            #[cfg(target_os = "linux")]
            LocaleCategory::LcMessages => libc::LC_MESSAGES,
            #[cfg(not(target_os = "linux"))]
            LocaleCategory::LcMessages => libc::LC_ALL,
        }
    }
}

/// Sets the process locale for `category`, returning the locale string the
/// C library reports back, if any.
///
/// `locale` is typically `""`, meaning "use the environment" (`LANG`,
/// `LC_ALL`, etc).
pub fn setlocale(category: LocaleCategory, locale: impl AsRef<str>) -> Option<String> {
    let c_locale = CString::new(locale.as_ref()).ok()?;
    unsafe {
        let res = libc::setlocale(category.as_c_int(), c_locale.as_ptr());
        if res.is_null() {
            None
        } else {
            Some(CStr::from_ptr(res).to_string_lossy().into_owned())
        }
    }
}

/// Registers the translation domain used by subsequent `gettext` calls.
///
/// No message catalogs are bundled with this workspace, so this currently
/// only records the domain name; lookups fall back to the original string.
pub fn textdomain(domain: impl AsRef<str>) -> Result<(), std::str::Utf8Error> {
    let _ = domain.as_ref();
    Ok(())
}

/// Sets the codeset used to encode translated strings.
pub fn bind_textdomain_codeset(
    domain: impl AsRef<str>,
    codeset: impl AsRef<str>,
) -> Result<(), std::str::Utf8Error> {
    let _ = (domain.as_ref(), codeset.as_ref());
    Ok(())
}

/// Looks up the translation of `msgid` in the current domain.
///
/// Without a bound message catalog this is the identity function, which is
/// the correct behavior for the `C`/`POSIX` locale and a safe fallback for
/// any other.
pub fn gettext(msgid: impl AsRef<str>) -> String {
    msgid.as_ref().to_string()
}
