pub mod cleanup;
pub mod identity;
pub mod login;
pub mod oauth;
pub mod session;

pub use cleanup::SessionCleanupTask;
pub use identity::IdentityResolver;
pub use login::{LoginOutcome, LoginService};
pub use oauth::{OAuthProvider, ProviderProfile, ProviderRegistry};
pub use session::SessionManager;
