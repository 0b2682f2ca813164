pub mod browser;
pub mod callback;
pub mod endpoints;
pub mod flow;
pub mod pkce;
pub mod random;
pub mod registry;
pub mod status;
pub mod store;
pub mod token;

pub use browser::{BrowserOpener, NoBrowser, SystemBrowser};
pub use callback::{CallbackListener, CallbackResult, PageRenderer};
pub use endpoints::ProviderEndpoints;
pub use flow::{AuthOrchestrator, AuthState};
pub use pkce::PkceChallenge;
pub use random::{OsSecretSource, SecretSource};
pub use registry::{ClientCredentials, ClientRegistry};
pub use status::{StatusReport, TokenStatus};
pub use store::{CredentialStore, FileStore, MemoryStore};
pub use token::{TokenLifecycle, TokenSet};
