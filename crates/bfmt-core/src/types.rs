use serde::{Deserialize, Serialize};

/// Direction of a cipher run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plaintext in, padded ciphertext out
    Encrypt,
    /// Padded ciphertext in, trimmed plaintext out
    Decrypt,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Encrypt => "encrypt",
            Mode::Decrypt => "decrypt",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
