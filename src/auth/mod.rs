pub mod callback;
pub mod credential;
pub mod pkce;
pub mod token;

pub use callback::{CallbackListener, CallbackOutcome};
pub use credential::{load_credential, save_credential, Credential, TokenResponse};
pub use pkce::{generate_state, PkcePair};
pub use token::{AuthState, PendingAuthorization, TokenManager};
