pub use super::launches::Entity as Launches;
