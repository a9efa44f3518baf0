pub use super::channels::Entity as Channels;
pub use super::messages::Entity as Messages;
pub use super::users::Entity as Users;
