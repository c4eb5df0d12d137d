//! The secure key store capability interface.

use crate::error::Result;

/// Length of an Ed25519 key (public or secret seed) in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Key slot holding the device public key.
pub const KEY_SLOT: u8 = 10;

/// Protected-storage offset of the device private key.
pub const PRIVATE_KEY_OFFSET: u16 = 0;

/// Operations the attestation core consumes from a secure element.
///
/// All operations are synchronous and blocking. A failed call is a total
/// failure: callers never rely on partial writes. Implementations are not
/// reentrant; wrap them in an [`ElementSession`](crate::ElementSession)
/// to share one element within a process.
pub trait SecureKeyStore: Send {
    /// Open the channel to the element.
    fn init(&mut self) -> Result<()>;

    /// Draw `len` bytes from the element's random number generator.
    fn random(&mut self, len: u8) -> Result<Vec<u8>>;

    /// Store the device key pair: the public key in [`KEY_SLOT`], the
    /// private key in protected storage at [`PRIVATE_KEY_OFFSET`].
    ///
    /// Overwrites any key pair already present.
    fn save_key_pair(&mut self, public: &[u8; KEY_LEN], private: &[u8; KEY_LEN]) -> Result<()>;

    /// Read the public key from [`KEY_SLOT`].
    fn public_key(&mut self) -> Result<[u8; KEY_LEN]>;

    /// Read `len` bytes of protected storage starting at `offset`.
    fn read_protected(&mut self, offset: u16, len: u16) -> Result<Vec<u8>>;

    /// Write `data` into protected storage starting at `offset`.
    fn write_protected(&mut self, offset: u16, data: &[u8]) -> Result<()>;

    /// Compute SHA-256 of `data` on the element.
    fn sha256(&mut self, data: &[u8]) -> Result<[u8; DIGEST_LEN]>;

    /// Release the channel to the element.
    fn close(&mut self) -> Result<()>;
}

/// A boxed key store for backends chosen at runtime.
pub type BoxedKeyStore = Box<dyn SecureKeyStore>;

impl<S: SecureKeyStore + ?Sized> SecureKeyStore for Box<S> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn random(&mut self, len: u8) -> Result<Vec<u8>> {
        (**self).random(len)
    }

    fn save_key_pair(&mut self, public: &[u8; KEY_LEN], private: &[u8; KEY_LEN]) -> Result<()> {
        (**self).save_key_pair(public, private)
    }

    fn public_key(&mut self) -> Result<[u8; KEY_LEN]> {
        (**self).public_key()
    }

    fn read_protected(&mut self, offset: u16, len: u16) -> Result<Vec<u8>> {
        (**self).read_protected(offset, len)
    }

    fn write_protected(&mut self, offset: u16, data: &[u8]) -> Result<()> {
        (**self).write_protected(offset, data)
    }

    fn sha256(&mut self, data: &[u8]) -> Result<[u8; DIGEST_LEN]> {
        (**self).sha256(data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
