use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Ciphertext is not valid base64")]
    InvalidEncoding,

    #[error("Decrypted content is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Invalid key encoding: {0}")]
    InvalidKeyHex(#[from] hex::FromHexError),
}

/// A wire payload that does not match the pinned schema.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown chat type: {0}")]
    UnknownChatType(String),

    #[error("Group chat {0} has no name")]
    MissingGroupName(i64),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
