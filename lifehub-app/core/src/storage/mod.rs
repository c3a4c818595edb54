mod backend;
mod config;
mod memory;
mod secure;

pub use backend::{BlobStore, CacheStore, CapsuleStore, TokenStore, VaultItemStore};
pub use config::{load_settings, save_settings, AppSettings, PasscodeKdfParams};
pub use memory::{
    MemoryBlobStore, MemoryCacheStore, MemoryCapsuleStore, MemoryTokenStore,
    MemoryVaultItemStore, MEMORY_BLOB_URL_PREFIX,
};
pub use secure::{FileSecureStorage, MemorySecureStorage, SecureStorage, SECURE_STORE_FILE_NAME};
