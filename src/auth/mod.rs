//! Authentication against the identity provider.
//!
//! Three mutually exclusive login modes:
//! - **Browser**: authorization code + PKCE, captured on a loopback listener
//! - **Device code**: sign-in completed on another device
//! - **Client secret**: client-credential grant for service principals
//!
//! [`AuthEngine::get_access_token`] renews according to how the active
//! account was logged in.

mod authority;
mod credential;
mod engine;
mod interaction;
mod loopback;
mod pkce;
mod token;

pub use authority::{Authority, DEFAULT_AUTHORITY_HOST, MANAGEMENT_SCOPE};
pub use credential::AccessToken;
pub use engine::{AuthEngine, AuthEngineBuilder, LoggedIn, LoginOptions, REDIRECT_PORT};
pub use interaction::{Interaction, SystemInteraction};
pub use loopback::{CALLBACK_PATH, CallbackOutcome, LoopbackServer, redirect_uri_for};
pub use pkce::{PkcePair, code_challenge};
pub use token::{DeviceCodeResponse, DevicePoll, ProviderError, TokenClient, TokenResponse};
