use tessera_types::error::TesseraError;
use tessera_types::primitives::{Address, Hash, Signature};

use crate::keys::Keypair;

/// Key custody seam: produces recoverable signatures for one address.
pub trait Signer: Send + Sync {
    /// Address whose signatures this signer produces.
    fn address(&self) -> Address;

    /// Sign a 32-byte digest.
    fn sign(&self, digest: &Hash) -> Result<Signature, TesseraError>;
}

impl Signer for Keypair {
    fn address(&self) -> Address {
        Keypair::address(self)
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, TesseraError> {
        self.sign_digest(digest)
    }
}

impl<S: Signer + ?Sized> Signer for Box<S> {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, TesseraError> {
        (**self).sign(digest)
    }
}

impl<S: Signer + ?Sized> Signer for std::sync::Arc<S> {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, TesseraError> {
        (**self).sign(digest)
    }
}
