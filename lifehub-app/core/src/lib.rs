pub mod cache;
pub mod clock;
pub mod commands;
pub mod error;
pub mod integrations;
pub mod security;
pub mod state;
pub mod storage;
pub mod vault;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use cache::{Cached, ExternalCache, Provider};
pub use error::{LifeHubError, Result};
pub use state::{AppState, Backends, Providers};
pub use vault::{VaultError, VaultStatus};

/// Install the global tracing subscriber. Call once from the host shell.
///
/// `RUST_LOG` overrides the default filter. Calling it again is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifehub_app_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
