//! # Recovery Phrase (BIP39)
//!
//! Implementation of BIP39 mnemonic phrases for identity backup and recovery.
//!
//! ## BIP39 Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      BIP39 MNEMONIC GENERATION                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Generate Entropy                                              │
//! │  ────────────────────────────                                           │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  128 bits (12 words) or 256 bits (24 words) of             │       │
//! │  │  cryptographically secure random data                      │       │
//! │  │                                                             │       │
//! │  │  Source: Operating system CSPRNG                           │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 2: Calculate Checksum                                            │
//! │  ───────────────────────────                                            │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  checksum = first (entropy_bits / 32) bits of              │       │
//! │  │             SHA256(entropy)                                │       │
//! │  │                                                             │       │
//! │  │  12 words → 4 checksum bits, 24 words → 8 checksum bits    │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 3: Combine and Split                                             │
//! │  ──────────────────────────                                             │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  combined = entropy || checksum                            │       │
//! │  │                                                             │       │
//! │  │  132 bits / 11 = 12 words                                  │       │
//! │  │  264 bits / 11 = 24 words                                  │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 4: Map to Words                                                  │
//! │  ────────────────────                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  Each 11-bit value (0-2047) maps to BIP39 wordlist         │       │
//! │  │                                                             │       │
//! │  │  "abandon" (index 0) ... "zoo" (index 2047)                │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Seed Derivation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      BIP39 SEED DERIVATION                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  PBKDF2-HMAC-SHA512(                                       │       │
//! │  │                                                             │       │
//! │  │    password = mnemonic_sentence,                           │       │
//! │  │               (words joined by spaces, NFKD normalized)    │       │
//! │  │                                                             │       │
//! │  │    salt = "mnemonic" + passphrase,                        │       │
//! │  │           (passphrase is optional, empty by default)       │       │
//! │  │                                                             │       │
//! │  │    iterations = 2048,                                      │       │
//! │  │                                                             │       │
//! │  │    key_length = 64 bytes                                   │       │
//! │  │  )                                                         │       │
//! │  │                                                             │       │
//! │  │  → 512-bit seed, fed whole into the HKDF key schedule     │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Measure |
//! |--------|---------|
//! | Entropy | 128/256 bits from OS CSPRNG |
//! | Checksum | Prevents typos |
//! | KDF | PBKDF2 with 2048 iterations |
//! | Storage | Phrase should be written down, never stored digitally |
//! | Display | Show once, never log |

use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::crypto::SEED_LENGTH;
use crate::error::{Error, Result};

/// Number of words in a standard recovery phrase
pub const WORD_COUNT: usize = 12;

/// Number of words in an extended recovery phrase
pub const WORD_COUNT_LONG: usize = 24;

/// Entropy size in bytes for 12 words (128 bits)
const ENTROPY_BYTES: usize = 16;

/// Entropy size in bytes for 24 words (256 bits)
const ENTROPY_BYTES_LONG: usize = 32;

/// A BIP39 recovery phrase for identity backup
///
/// ## Security Warning
///
/// - This phrase can fully recover the user's identity
/// - Should be shown to the user exactly once
/// - Should never be logged or stored in plaintext
/// - User should write it down on paper
#[derive(ZeroizeOnDrop)]
pub struct RecoveryPhrase {
    /// The underlying BIP39 mnemonic
    #[zeroize(skip)] // bip39::Mnemonic doesn't implement Zeroize
    mnemonic: Mnemonic,
}

impl RecoveryPhrase {
    /// Generate a new random 12-word recovery phrase
    pub fn generate() -> Result<Self> {
        Self::from_entropy(&Self::random_entropy::<ENTROPY_BYTES>())
    }

    /// Generate a 24-word recovery phrase (256 bits of entropy)
    pub fn generate_long() -> Result<Self> {
        Self::from_entropy(&Self::random_entropy::<ENTROPY_BYTES_LONG>())
    }

    fn random_entropy<const N: usize>() -> [u8; N] {
        let mut entropy = [0u8; N];
        rand::rngs::OsRng.fill_bytes(&mut entropy);
        entropy
    }

    fn from_entropy(entropy: &[u8]) -> Result<Self> {
        let mnemonic = Mnemonic::from_entropy(entropy).map_err(|e| {
            Error::KeyDerivationFailed(format!("Failed to generate mnemonic: {}", e))
        })?;
        Ok(Self { mnemonic })
    }

    /// Parse a recovery phrase from words
    ///
    /// ## Validation
    ///
    /// - Must be exactly 12 or 24 words
    /// - All words must be in the BIP39 English wordlist
    /// - Checksum must be valid
    ///
    /// Input is normalized first (trimmed, lowercased, whitespace
    /// collapsed), so pasted phrases with stray spacing are accepted.
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let normalized = normalize_phrase(phrase);

        let mnemonic = Mnemonic::parse_normalized(&normalized)
            .map_err(|e| Error::InvalidMnemonic(format!("{}", e)))?;

        let count = mnemonic.word_count();
        if count != WORD_COUNT && count != WORD_COUNT_LONG {
            return Err(Error::InvalidMnemonic(format!(
                "Expected {} or {} words, got {}",
                WORD_COUNT, WORD_COUNT_LONG, count
            )));
        }

        Ok(Self { mnemonic })
    }

    /// Parse from a list of words
    pub fn from_words(words: &[&str]) -> Result<Self> {
        if words.len() != WORD_COUNT && words.len() != WORD_COUNT_LONG {
            return Err(Error::InvalidMnemonic(format!(
                "Expected {} or {} words, got {}",
                WORD_COUNT,
                WORD_COUNT_LONG,
                words.len()
            )));
        }

        let phrase = words.join(" ");
        Self::from_phrase(&phrase)
    }

    /// Get the words as a vector
    pub fn words(&self) -> Vec<&'static str> {
        self.mnemonic.words().collect()
    }

    /// Get the phrase as a single string (words separated by spaces)
    ///
    /// ## Security Warning
    ///
    /// Only use this for display to user. Never log or store.
    pub fn phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    /// Derive the 64-byte master seed from this recovery phrase
    ///
    /// Uses empty passphrase (standard BIP39 behavior), matching the
    /// other platform clients.
    pub fn to_seed(&self) -> [u8; SEED_LENGTH] {
        self.to_seed_with_passphrase("")
    }

    /// Derive the master seed with an optional passphrase
    ///
    /// The passphrase provides an additional layer of security:
    /// same mnemonic + different passphrase = entirely different keys.
    pub fn to_seed_with_passphrase(&self, passphrase: &str) -> [u8; SEED_LENGTH] {
        self.mnemonic.to_seed(passphrase)
    }

    /// Validate a phrase without creating a RecoveryPhrase
    ///
    /// Useful for UI validation before submission.
    pub fn validate(phrase: &str) -> Result<()> {
        Self::from_phrase(phrase)?;
        Ok(())
    }

    /// Check if a single word is in the BIP39 wordlist
    pub fn is_valid_word(word: &str) -> bool {
        let word_lower = word.to_lowercase();
        Language::English
            .word_list()
            .iter()
            .any(|w| *w == word_lower)
    }

    /// Get word suggestions for autocomplete
    ///
    /// Returns words from the BIP39 wordlist that start with the given prefix.
    pub fn suggest_words(prefix: &str) -> Vec<&'static str> {
        if prefix.is_empty() {
            return vec![];
        }

        let prefix_lower = prefix.to_lowercase();
        let mut suggestions = Vec::new();

        for word in Language::English.word_list().iter() {
            if word.starts_with(&prefix_lower) {
                suggestions.push(*word);
                if suggestions.len() >= 10 {
                    break;
                }
            }
        }

        suggestions
    }
}

// Prevent accidental logging
impl std::fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoveryPhrase([REDACTED])")
    }
}

/// Normalize a pasted phrase: trim, collapse whitespace, lowercase
///
/// The English wordlist is ASCII so lowercasing covers NFKD here.
fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_recovery_phrase() {
        let phrase = RecoveryPhrase::generate().unwrap();
        assert_eq!(phrase.words().len(), 12);
    }

    #[test]
    fn test_generate_long_recovery_phrase() {
        let phrase = RecoveryPhrase::generate_long().unwrap();
        assert_eq!(phrase.words().len(), 24);
    }

    #[test]
    fn test_parse_valid_phrase() {
        // This is a valid BIP39 phrase (DO NOT USE FOR REAL!)
        let test_phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

        let phrase = RecoveryPhrase::from_phrase(test_phrase).unwrap();
        assert_eq!(phrase.words().len(), 12);
    }

    #[test]
    fn test_parse_normalizes_whitespace_and_case() {
        let messy = "  Abandon ABANDON abandon\tabandon abandon abandon abandon abandon abandon abandon  abandon about ";

        let phrase = RecoveryPhrase::from_phrase(messy).unwrap();
        assert_eq!(phrase.words().len(), 12);
        assert_eq!(phrase.words()[0], "abandon");
    }

    #[test]
    fn test_parse_invalid_word() {
        let invalid_phrase = "notaword abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

        let result = RecoveryPhrase::from_phrase(invalid_phrase);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_wrong_word_count() {
        let short_phrase = "abandon abandon abandon";
        let result = RecoveryPhrase::from_phrase(short_phrase);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_bad_checksum() {
        // All "abandon" fails the checksum (needs "about" at the end)
        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(RecoveryPhrase::from_phrase(bad).is_err());
    }

    #[test]
    fn test_seed_derivation_deterministic() {
        let phrase = RecoveryPhrase::generate().unwrap();

        let seed1 = phrase.to_seed();
        let seed2 = phrase.to_seed();

        assert_eq!(seed1, seed2);
    }

    #[test]
    fn test_seed_is_64_bytes() {
        let phrase = RecoveryPhrase::generate().unwrap();
        assert_eq!(phrase.to_seed().len(), 64);
    }

    #[test]
    fn test_different_phrases_different_seeds() {
        let phrase1 = RecoveryPhrase::generate().unwrap();
        let phrase2 = RecoveryPhrase::generate().unwrap();

        assert_ne!(phrase1.to_seed(), phrase2.to_seed());
    }

    #[test]
    fn test_passphrase_changes_seed() {
        let phrase = RecoveryPhrase::generate().unwrap();

        let seed_no_pass = phrase.to_seed_with_passphrase("");
        let seed_with_pass = phrase.to_seed_with_passphrase("secret");

        assert_ne!(seed_no_pass, seed_with_pass);
    }

    #[test]
    fn test_is_valid_word() {
        assert!(RecoveryPhrase::is_valid_word("abandon"));
        assert!(RecoveryPhrase::is_valid_word("zoo"));
        assert!(!RecoveryPhrase::is_valid_word("notaword"));
    }

    #[test]
    fn test_suggest_words() {
        let suggestions = RecoveryPhrase::suggest_words("ab");
        assert!(suggestions.contains(&"abandon"));
        assert!(suggestions.contains(&"ability"));
        assert!(suggestions.contains(&"able"));
    }

    #[test]
    fn test_debug_redacts() {
        let phrase = RecoveryPhrase::generate().unwrap();
        let debug = format!("{:?}", phrase);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("abandon")); // Should not contain any actual words
    }
}
