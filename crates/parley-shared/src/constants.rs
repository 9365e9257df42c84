/// Application name
pub const APP_NAME: &str = "Parley";

/// Path prefix of every REST endpoint on the backend
pub const API_PREFIX: &str = "/api";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Shown in place of a message body that cannot be decrypted
pub const DECRYPTION_SENTINEL: &str = "[unable to decrypt message]";

/// Shown as the preview of a message that only carries a file
pub const ATTACHMENT_PREVIEW: &str = "[attachment]";

/// Title used when a chat has no resolvable name
pub const DEFAULT_CHAT_TITLE: &str = "Chat";

/// Preview length in characters before truncation
pub const PREVIEW_MAX_CHARS: usize = 30;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Default number of messages fetched per chat load
pub const DEFAULT_MESSAGE_LIMIT: u32 = 50;

/// Upper bound the backend accepts for `limit`
pub const MAX_MESSAGE_LIMIT: u32 = 100;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Default poll cadence in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Lower bound for the search debounce window in milliseconds
pub const MIN_SEARCH_DEBOUNCE_MS: u64 = 300;

/// Key derivation context (BLAKE3) for passphrase-provisioned message keys
pub const KDF_CONTEXT_MESSAGE_KEY: &str = "parley-message-key-v1";

/// Content types the backend accepts for avatars
pub const AVATAR_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
