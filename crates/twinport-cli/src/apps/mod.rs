pub mod chat;
pub mod static_site;

pub use chat::Chat;
pub use static_site::StaticSite;
