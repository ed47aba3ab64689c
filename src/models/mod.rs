pub mod message;
pub mod profile;
pub mod session;
pub mod user;

pub use message::Message;
pub use profile::{Profile, ProfileData};
pub use session::{NewSession, Session, SessionStatus};
pub use user::{NewUser, Role, User, UserPublic};
