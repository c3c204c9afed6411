//! Authentication and authorization schemes for the gateway (spec §4.6):
//! bearer-key auth with guest synthesis and local-admin bootstrap, JWT
//! issuance/verification for the login flow, and project membership checks
//! for the code-assistant config sync.

pub mod bearer;
pub mod jwt;
pub mod project;

pub use bearer::{is_guest, BearerAuth};
pub use jwt::JwtIssuer;
pub use project::ProjectAuth;
