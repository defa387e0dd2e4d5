use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use tessera_types::error::TesseraError;
use tessera_types::primitives::{Address, Hash, Signature};

use crate::address::pubkey_to_address;

/// Offset added to the recovery id in the `v` byte of a signature.
const RECOVERY_ID_OFFSET: u8 = 27;

/// Wrapper around a secp256k1 signing key.
pub struct Keypair {
    inner: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: SigningKey::random(&mut csprng),
        }
    }

    /// Create a keypair from a 32-byte secret scalar.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, TesseraError> {
        let inner = SigningKey::from_slice(seed).map_err(|_| TesseraError::InvalidKeyMaterial)?;
        Ok(Self { inner })
    }

    /// Address controlled by this keypair.
    pub fn address(&self) -> Address {
        pubkey_to_address(self.inner.verifying_key())
    }

    /// The 32-byte secret scalar of this keypair.
    pub fn seed(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    /// Sign a 32-byte digest, returning `r ‖ s ‖ v` with `v = recid + 27`.
    pub fn sign_digest(&self, digest: &Hash) -> Result<Signature, TesseraError> {
        let (sig, recid) = self
            .inner
            .sign_prehash_recoverable(digest)
            .map_err(|e| TesseraError::SigningFailed {
                reason: e.to_string(),
            })?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recid.to_byte() + RECOVERY_ID_OFFSET;
        Ok(out)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &hex::encode(self.address()))
            .finish_non_exhaustive()
    }
}

/// Accepts both raw (0/1) and offset (27/28) recovery ids.
fn parse_recovery_id(v: u8) -> Result<RecoveryId, TesseraError> {
    let raw = match v {
        0 | 1 => v,
        27 | 28 => v - RECOVERY_ID_OFFSET,
        other => {
            return Err(TesseraError::RecoveryFailed {
                reason: format!("invalid recovery id {other}"),
            })
        }
    };
    RecoveryId::from_byte(raw).ok_or_else(|| TesseraError::RecoveryFailed {
        reason: format!("invalid recovery id {v}"),
    })
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover(digest: &Hash, signature: &Signature) -> Result<Address, TesseraError> {
    let recid = parse_recovery_id(signature[64])?;
    let sig = EcdsaSignature::from_slice(&signature[..64]).map_err(|e| {
        TesseraError::RecoveryFailed {
            reason: e.to_string(),
        }
    })?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recid).map_err(|e| {
        TesseraError::RecoveryFailed {
            reason: e.to_string(),
        }
    })?;
    Ok(pubkey_to_address(&key))
}

/// True if `signature` over `digest` recovers to `expected`.
pub fn verify_signer(digest: &Hash, signature: &Signature, expected: &Address) -> bool {
    matches!(recover(digest, signature), Ok(addr) if addr == *expected)
}
