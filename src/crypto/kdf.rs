//! # Key Derivation
//!
//! This module turns a recovery phrase into the full set of identity keys.
//! The schedule is frozen: it must produce byte-identical output on every
//! platform, or recovered accounts would not match their originals.
//!
//! ## Key Derivation Chain
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION HIERARCHY                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  BIP39 RECOVERY PHRASE                          │   │
//! │  │                                                                 │   │
//! │  │  "abandon abandon abandon ... about"  (12 or 24 words)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │                                ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  BIP39 SEED DERIVATION                          │   │
//! │  │                                                                 │   │
//! │  │  PBKDF2-HMAC-SHA512(                                            │   │
//! │  │    password = mnemonic_words,                                   │   │
//! │  │    salt = "mnemonic" + passphrase,                              │   │
//! │  │    iterations = 2048,                                           │   │
//! │  │    output_length = 64 bytes                                     │   │
//! │  │  )                                                              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │                                ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              HKDF-SHA256 (salt = "whisper")                     │   │
//! │  │                                                                 │   │
//! │  │  ikm = 64-byte BIP39 seed                                       │   │
//! │  │       │                                                         │   │
//! │  │       ├──► info = "whisper/enc"      → 32-byte enc seed         │   │
//! │  │       ├──► info = "whisper/sign"     → 32-byte sign seed        │   │
//! │  │       └──► info = "whisper/contacts" → 32-byte contacts key     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  enc seed   → X25519 private key (used directly)                        │
//! │  sign seed  → Ed25519 keypair (seeded generation)                       │
//! │  contacts key → symmetric key for contacts backup sealing               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Design Choice | Rationale |
//! |--------|---------------|-----------|
//! | KDF Algorithm | HKDF-SHA256 | Well-analyzed, recommended by NIST |
//! | Key Separation | Different `info` strings | Keys per purpose are independent |
//! | Salt | Fixed `"whisper"` | Binds the schedule to this protocol |
//! | Determinism | No randomness after the phrase | Cross-device recovery |

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Length of the BIP-39 seed in bytes
pub const SEED_LENGTH: usize = 64;

/// Length of every derived key in bytes
pub const DERIVED_KEY_LENGTH: usize = 32;

/// Fixed HKDF salt binding the schedule to this protocol
pub const HKDF_SALT: &[u8] = b"whisper";

/// Domain separation strings for HKDF
///
/// These ensure that keys derived for different purposes are
/// cryptographically independent, even though they share one seed.
/// The literals are part of the wire-compatible key schedule and must
/// never change.
pub mod domain {
    /// Domain for the X25519 encryption private key
    pub const ENCRYPTION: &[u8] = b"whisper/enc";

    /// Domain for the Ed25519 signing seed
    pub const SIGNING: &[u8] = b"whisper/sign";

    /// Domain for the contacts backup key
    pub const CONTACTS: &[u8] = b"whisper/contacts";
}

/// Keys derived from a recovery phrase
///
/// All three fields are secret; the struct zeroizes on drop and redacts
/// itself from `Debug` output.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    /// X25519 private key material (32 bytes, used directly)
    pub enc_seed: [u8; 32],

    /// Ed25519 seed (32 bytes, expanded into a signing keypair)
    pub sign_seed: [u8; 32],

    /// Symmetric key for contacts backup sealing (32 bytes)
    pub contacts_key: [u8; 32],
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("enc_seed", &"[REDACTED]")
            .field("sign_seed", &"[REDACTED]")
            .field("contacts_key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the 64-byte BIP-39 seed from a mnemonic phrase
///
/// ## Parameters
///
/// - `mnemonic`: whitespace-normalized BIP-39 phrase
/// - `passphrase`: optional BIP-39 passphrase ("" for none)
///
/// ## Errors
///
/// Returns [`Error::InvalidMnemonic`] if checksum or wordlist validation
/// fails.
pub fn seed_from_mnemonic(mnemonic: &str, passphrase: &str) -> Result<[u8; SEED_LENGTH]> {
    let parsed = bip39::Mnemonic::parse_normalized(mnemonic)?;
    Ok(parsed.to_seed(passphrase))
}

/// Expand a BIP-39 seed into the three domain keys
///
/// ## Process
///
/// ```text
/// 64-byte seed
///       │
///       ├──► HKDF(salt="whisper", info="whisper/enc")      → enc seed
///       ├──► HKDF(salt="whisper", info="whisper/sign")     → sign seed
///       └──► HKDF(salt="whisper", info="whisper/contacts") → contacts key
/// ```
///
/// ## Errors
///
/// Returns [`Error::InvalidSeedLength`] unless the seed is exactly
/// 64 bytes.
pub fn derive_from_seed(seed: &[u8]) -> Result<DerivedKeys> {
    if seed.len() != SEED_LENGTH {
        return Err(Error::InvalidSeedLength(seed.len()));
    }

    let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), seed);

    let mut enc_seed = [0u8; DERIVED_KEY_LENGTH];
    hkdf.expand(domain::ENCRYPTION, &mut enc_seed)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive encryption seed".into()))?;

    let mut sign_seed = [0u8; DERIVED_KEY_LENGTH];
    hkdf.expand(domain::SIGNING, &mut sign_seed)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive signing seed".into()))?;

    let mut contacts_key = [0u8; DERIVED_KEY_LENGTH];
    hkdf.expand(domain::CONTACTS, &mut contacts_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive contacts key".into()))?;

    Ok(DerivedKeys {
        enc_seed,
        sign_seed,
        contacts_key,
    })
}

/// Derive all identity keys from a mnemonic phrase
///
/// Composes [`seed_from_mnemonic`] and [`derive_from_seed`].
/// Deterministic: identical mnemonic + passphrase always yields identical
/// keys, which is what makes cross-device recovery work.
///
/// ## Security Note
///
/// The intermediate 64-byte seed is zeroized before this function
/// returns.
pub fn derive_all(mnemonic: &str, passphrase: &str) -> Result<DerivedKeys> {
    let mut seed = seed_from_mnemonic(mnemonic, passphrase)?;
    let keys = derive_from_seed(&seed);
    seed.zeroize();
    keys
}

// ============================================================================
// TESTS
// ============================================================================
