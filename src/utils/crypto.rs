//! Password hashing and random strings

use std::fmt;
use std::str::FromStr;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

/// Default alphabet for [`get_random_string`]: ASCII letters and digits
pub const DEFAULT_ALLOWED_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const ARGON2_MEMORY_COST: u32 = 65536; // 64 MB
const ARGON2_TIME_COST: u32 = 2;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_HASH_LEN: usize = 16;
const MD5_PREFIX: &str = "md5$";

/// Crypto error
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Unsupported hashing scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Hashing failed: {0}")]
    Hashing(String),
}

/// Supported password hashing schemes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashingScheme {
    #[default]
    Argon2,
    Bcrypt,
    /// Salted MD5. Only meant for tests, never for real passwords.
    Md5,
}

impl HashingScheme {
    /// All supported schemes
    pub fn choices() -> [HashingScheme; 3] {
        [Self::Argon2, Self::Bcrypt, Self::Md5]
    }

    /// Check whether a name refers to a supported scheme
    pub fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Argon2 => "argon2",
            Self::Bcrypt => "bcrypt",
            Self::Md5 => "md5",
        }
    }

    /// Identify the scheme that produced a stored hash
    pub fn identify(hash: &str) -> Option<Self> {
        if hash.starts_with("$argon2") {
            Some(Self::Argon2)
        } else if hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$") {
            Some(Self::Bcrypt)
        } else if hash.starts_with(MD5_PREFIX) {
            Some(Self::Md5)
        } else {
            None
        }
    }
}

impl FromStr for HashingScheme {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argon2" => Ok(Self::Argon2),
            "bcrypt" => Ok(Self::Bcrypt),
            "md5" => Ok(Self::Md5),
            _ => Err(CryptoError::UnsupportedScheme(s.to_string())),
        }
    }
}

impl fmt::Display for HashingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Password hasher bound to one scheme
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    scheme: HashingScheme,
    bcrypt_cost: u32,
}

impl PasswordHasher {
    /// Create a hasher for a scheme
    pub fn new(scheme: HashingScheme) -> Self {
        Self {
            scheme,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Create a hasher from a scheme name
    pub fn from_name(name: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(name.parse()?))
    }

    /// Override the bcrypt work factor
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Configured scheme
    pub fn scheme(&self) -> HashingScheme {
        self.scheme
    }

    fn argon2() -> Result<Argon2<'static>, CryptoError> {
        let params = Params::new(
            ARGON2_MEMORY_COST,
            ARGON2_TIME_COST,
            ARGON2_PARALLELISM,
            Some(ARGON2_HASH_LEN),
        )
        .map_err(|e| CryptoError::Hashing(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, CryptoError> {
        match self.scheme {
            HashingScheme::Argon2 => {
                let salt = SaltString::generate(&mut OsRng);
                let hash = Self::argon2()?
                    .hash_password(password.as_bytes(), &salt)
                    .map_err(|e| CryptoError::Hashing(e.to_string()))?;
                Ok(hash.to_string())
            }
            HashingScheme::Bcrypt => bcrypt::hash(password, self.bcrypt_cost)
                .map_err(|e| CryptoError::Hashing(e.to_string())),
            HashingScheme::Md5 => {
                let salt = get_random_string(12, DEFAULT_ALLOWED_CHARS);
                Ok(md5_hash(password, &salt))
            }
        }
    }

    /// Verify a password against a stored hash.
    ///
    /// Hashes produced by another scheme or malformed hashes never verify.
    pub fn verify(&self, password: &str, hashed: &str) -> bool {
        if HashingScheme::identify(hashed) != Some(self.scheme) {
            return false;
        }

        match self.scheme {
            HashingScheme::Argon2 => PasswordHash::new(hashed)
                .map(|parsed| {
                    Argon2::default()
                        .verify_password(password.as_bytes(), &parsed)
                        .is_ok()
                })
                .unwrap_or(false),
            HashingScheme::Bcrypt => bcrypt::verify(password, hashed).unwrap_or(false),
            HashingScheme::Md5 => hashed
                .strip_prefix(MD5_PREFIX)
                .and_then(|rest| rest.split_once('$'))
                .map(|(salt, _)| md5_hash(password, salt) == hashed)
                .unwrap_or(false),
        }
    }

    /// Check whether a stored hash should be regenerated with the current
    /// scheme and parameters
    pub fn needs_rehash(&self, hashed: &str) -> bool {
        if HashingScheme::identify(hashed) != Some(self.scheme) {
            return true;
        }

        match self.scheme {
            HashingScheme::Argon2 => {
                let Ok(parsed) = PasswordHash::new(hashed) else {
                    return true;
                };
                match Params::try_from(&parsed) {
                    Ok(params) => {
                        params.m_cost() != ARGON2_MEMORY_COST
                            || params.t_cost() != ARGON2_TIME_COST
                            || params.p_cost() != ARGON2_PARALLELISM
                            || params.output_len() != Some(ARGON2_HASH_LEN)
                    }
                    Err(_) => true,
                }
            }
            HashingScheme::Bcrypt => hashed
                .split('$')
                .nth(2)
                .and_then(|cost| cost.parse::<u32>().ok())
                .map_or(true, |cost| cost != self.bcrypt_cost),
            HashingScheme::Md5 => false,
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(HashingScheme::default())
    }
}

fn md5_hash(password: &str, salt: &str) -> String {
    let digest = md5::compute(format!("{}{}", salt, password));
    format!("{}{}${:x}", MD5_PREFIX, salt, digest)
}

/// Generate a random string from the OS random source
pub fn get_random_string(length: usize, allowed_chars: &str) -> String {
    let chars: Vec<char> = allowed_chars.chars().collect();
    let mut rng = OsRng;

    (0..length)
        .filter_map(|_| chars.choose(&mut rng).copied())
        .collect()
}
