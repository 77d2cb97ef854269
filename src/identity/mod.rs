//! Identity and session management for the portal client and the `/auth/me` backend.
//! Keep the public surface thin and split implementation across sub-modules.

mod abilities;
mod claims;
mod session;
mod user_context;

pub use abilities::{Abilities, AbilityRuleSet, Action, Capability, ResourceKind, RoleVocabulary};
pub use claims::{bearer_token, decode_unverified, ClaimsError, DecodedIdentityClaims, TokenVerifier};
pub use session::{AcquireError, Account, Credential, ResolvedUser, SessionManager, TokenSource};
pub use user_context::{normalize_role, Segment, UserContext};
