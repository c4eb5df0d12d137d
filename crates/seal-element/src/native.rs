//! Binding to the vendor secure element library (`libseadyn.so`).
//!
//! The library is loaded at runtime from an operator-configured path. Each
//! exported function returns `0` on success; any other value is a total
//! failure of that call.

#![allow(unsafe_code)]

use std::ffi::{c_char, c_int};
use std::path::Path;

use libloading::Library;
use tracing::{debug, info};

use crate::error::{ElementError, ElementOp, Result};
use crate::store::{SecureKeyStore, DIGEST_LEN, KEY_LEN, KEY_SLOT};

type InitFn = unsafe extern "C" fn(c_int) -> c_int;
type SaveKeyPairFn = unsafe extern "C" fn(u8, *const u8, u16, *const u8, u16) -> c_int;
type GetRandomFn = unsafe extern "C" fn(*mut u8, u8) -> c_int;
type WriteDataFn = unsafe extern "C" fn(u8, *const u8, u8) -> c_int;
type ReadDataFn = unsafe extern "C" fn(u16, *mut u8, u16) -> c_int;
type GetPubkeyFn = unsafe extern "C" fn(u8, *mut u8, *mut u16) -> c_int;
type GetSha256Fn = unsafe extern "C" fn(*const c_char, u8, *mut u8, *mut u8) -> c_int;
type CloseFn = unsafe extern "C" fn() -> c_int;

/// Size of the buffer the library fills with public key material.
const PUBKEY_BUFFER_LEN: usize = 64;

/// Secure element backed by the vendor's native library.
pub struct NativeElement {
    se_init: InitFn,
    se_save_key_pair: SaveKeyPairFn,
    se_get_random: GetRandomFn,
    se_write_data: WriteDataFn,
    se_read_data: ReadDataFn,
    se_get_pubkey: GetPubkeyFn,
    se_get_sha256: GetSha256Fn,
    se_close: CloseFn,
    // Keeps the function pointers above valid.
    _library: Library,
}

fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T> {
    let mut raw = name.as_bytes().to_vec();
    raw.push(0);
    // SAFETY: every `T` used with this helper matches the C prototype of the
    // named export in the vendor header.
    unsafe { library.get::<T>(&raw) }
        .map(|sym| *sym)
        .map_err(|e| ElementError::Library(format!("missing symbol {name}: {e}")))
}

fn check(op: ElementOp, status: c_int) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(ElementError::Status { op, code: status })
    }
}

impl NativeElement {
    /// Load the vendor library from `path` and resolve its exports.
    ///
    /// # Errors
    ///
    /// Returns [`ElementError::Library`] if the library or any export is
    /// missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initialisers; the path is
        // supplied by the operator and points at the vendor binding.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            ElementError::Library(format!("failed to load '{}': {e}", path.display()))
        })?;

        let element = Self {
            se_init: symbol(&library, "se_init")?,
            se_save_key_pair: symbol(&library, "se_save_key_pair")?,
            se_get_random: symbol(&library, "se_get_random")?,
            se_write_data: symbol(&library, "se_write_data")?,
            se_read_data: symbol(&library, "se_read_data")?,
            se_get_pubkey: symbol(&library, "se_get_pubkey")?,
            se_get_sha256: symbol(&library, "se_get_sha256")?,
            se_close: symbol(&library, "se_close")?,
            _library: library,
        };
        info!(path = %path.display(), "secure element library loaded");
        Ok(element)
    }
}

impl SecureKeyStore for NativeElement {
    fn init(&mut self) -> Result<()> {
        // SAFETY: plain value argument.
        check(ElementOp::Init, unsafe { (self.se_init)(0) })
    }

    fn random(&mut self, len: u8) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; usize::from(len)];
        // SAFETY: `buffer` holds exactly `len` writable bytes.
        check(ElementOp::Random, unsafe {
            (self.se_get_random)(buffer.as_mut_ptr(), len)
        })?;
        Ok(buffer)
    }

    fn save_key_pair(&mut self, public: &[u8; KEY_LEN], private: &[u8; KEY_LEN]) -> Result<()> {
        // SAFETY: `public` is 32 readable bytes; the private-key arguments are
        // a null pointer with zero length, which the library accepts.
        check(ElementOp::SaveKeyPair, unsafe {
            (self.se_save_key_pair)(KEY_SLOT, public.as_ptr(), 0, std::ptr::null(), 0)
        })?;
        self.write_protected(crate::PRIVATE_KEY_OFFSET, private)?;
        debug!("key pair stored on secure element");
        Ok(())
    }

    fn public_key(&mut self) -> Result<[u8; KEY_LEN]> {
        let mut buffer = [0u8; PUBKEY_BUFFER_LEN];
        let mut written: u16 = 0;
        // SAFETY: `buffer` is large enough for the slot's key material and
        // `written` is a valid out pointer.
        check(ElementOp::PublicKey, unsafe {
            (self.se_get_pubkey)(KEY_SLOT, buffer.as_mut_ptr(), &raw mut written)
        })?;
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&buffer[..KEY_LEN]);
        Ok(key)
    }

    fn read_protected(&mut self, offset: u16, len: u16) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; usize::from(len)];
        // SAFETY: `buffer` holds exactly `len` writable bytes.
        check(ElementOp::ReadProtected, unsafe {
            (self.se_read_data)(offset, buffer.as_mut_ptr(), len)
        })?;
        Ok(buffer)
    }

    fn write_protected(&mut self, offset: u16, data: &[u8]) -> Result<()> {
        let start = u8::try_from(offset).map_err(|_| ElementError::OutOfBounds {
            op: ElementOp::WriteProtected,
            offset: usize::from(offset),
            end: usize::from(offset) + data.len(),
        })?;
        let len = u8::try_from(data.len()).map_err(|_| ElementError::InputTooLong {
            op: ElementOp::WriteProtected,
            len: data.len(),
            max: usize::from(u8::MAX),
        })?;
        // SAFETY: `data` holds `len` readable bytes.
        check(ElementOp::WriteProtected, unsafe {
            (self.se_write_data)(start, data.as_ptr(), len)
        })
    }

    fn sha256(&mut self, data: &[u8]) -> Result<[u8; DIGEST_LEN]> {
        let len = u8::try_from(data.len()).map_err(|_| ElementError::InputTooLong {
            op: ElementOp::Hash,
            len: data.len(),
            max: usize::from(u8::MAX),
        })?;
        let mut digest = [0u8; DIGEST_LEN];
        let mut digest_len = DIGEST_LEN as u8;
        // SAFETY: `data` holds `len` readable bytes, `digest` has room for a
        // full SHA-256 output and `digest_len` is a valid in/out pointer.
        check(ElementOp::Hash, unsafe {
            (self.se_get_sha256)(
                data.as_ptr().cast::<c_char>(),
                len,
                digest.as_mut_ptr(),
                &raw mut digest_len,
            )
        })?;
        if usize::from(digest_len) != DIGEST_LEN {
            return Err(ElementError::UnexpectedLength {
                op: ElementOp::Hash,
                expected: DIGEST_LEN,
                actual: usize::from(digest_len),
            });
        }
        Ok(digest)
    }

    fn close(&mut self) -> Result<()> {
        // SAFETY: no arguments.
        check(ElementOp::Close, unsafe { (self.se_close)() })
    }
}
