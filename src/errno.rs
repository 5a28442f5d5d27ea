//! Symbolic errno translation table (spec §4.12: "OS-error code translation").
//!
//! OS error codes are specific to the platform that raised them. Before
//! transport, the sender records the *symbolic* name of the code (`EACCES`,
//! `ENOENT`, ...); on receipt, the symbol is translated back to the local
//! platform's numeric code, or the original number if the symbol is
//! unknown locally (tagged `EUNKWN` upstream, per the original).

#[cfg(unix)]
const TABLE: &[(&str, i32)] = &[
	("EPERM", libc::EPERM),
	("ENOENT", libc::ENOENT),
	("ESRCH", libc::ESRCH),
	("EINTR", libc::EINTR),
	("EIO", libc::EIO),
	("ENXIO", libc::ENXIO),
	("EBADF", libc::EBADF),
	("EAGAIN", libc::EAGAIN),
	("ENOMEM", libc::ENOMEM),
	("EACCES", libc::EACCES),
	("EFAULT", libc::EFAULT),
	("EBUSY", libc::EBUSY),
	("EEXIST", libc::EEXIST),
	("EXDEV", libc::EXDEV),
	("ENODEV", libc::ENODEV),
	("ENOTDIR", libc::ENOTDIR),
	("EISDIR", libc::EISDIR),
	("EINVAL", libc::EINVAL),
	("ENFILE", libc::ENFILE),
	("EMFILE", libc::EMFILE),
	("ENOTTY", libc::ENOTTY),
	("EFBIG", libc::EFBIG),
	("ENOSPC", libc::ENOSPC),
	("ESPIPE", libc::ESPIPE),
	("EROFS", libc::EROFS),
	("EMLINK", libc::EMLINK),
	("EPIPE", libc::EPIPE),
	("ENAMETOOLONG", libc::ENAMETOOLONG),
	("ENOTEMPTY", libc::ENOTEMPTY),
	("ELOOP", libc::ELOOP),
	("ENOSYS", libc::ENOSYS),
	("ECONNRESET", libc::ECONNRESET),
	("ECONNREFUSED", libc::ECONNREFUSED),
	("ETIMEDOUT", libc::ETIMEDOUT),
	("ENOTCONN", libc::ENOTCONN),
];

#[cfg(windows)]
const TABLE: &[(&str, i32)] = &[
	("EACCES", windows::Win32::Foundation::ERROR_ACCESS_DENIED.0 as i32),
	("ENOENT", windows::Win32::Foundation::ERROR_FILE_NOT_FOUND.0 as i32),
	("ENOTDIR", windows::Win32::Foundation::ERROR_PATH_NOT_FOUND.0 as i32),
	("EEXIST", windows::Win32::Foundation::ERROR_FILE_EXISTS.0 as i32),
	("EBUSY", windows::Win32::Foundation::ERROR_BUSY.0 as i32),
	("ENOSPC", windows::Win32::Foundation::ERROR_DISK_FULL.0 as i32),
	("EINVAL", windows::Win32::Foundation::ERROR_INVALID_PARAMETER.0 as i32),
	("EMFILE", windows::Win32::Foundation::ERROR_TOO_MANY_OPEN_FILES.0 as i32),
];

#[cfg(not(any(unix, windows)))]
const TABLE: &[(&str, i32)] = &[];

/// Look up the symbolic name for a local platform errno, if known.
pub fn local_to_symbol(code: i32) -> Option<String> {
	TABLE.iter().find(|(_, c)| *c == code).map(|(name, _)| (*name).to_string())
}

/// Look up the local platform's numeric code for a symbolic errno name.
pub fn symbol_to_local(symbol: &str) -> Option<i32> {
	TABLE.iter().find(|(name, _)| *name == symbol).map(|(_, code)| *code)
}
