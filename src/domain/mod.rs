/// Domain model shared by the auth service, the persistence layer and the
/// HTTP routes.

mod session;
mod store;
mod user;

pub use session::{Credentials, TokenPair};
pub use store::{RevocationLedger, UserStore};
pub use user::{NewUser, PasswordHash, Registration, User, UserFilter, UserPatch};
