//! sqlx repositories over the gateway schema

mod abuse_event;
mod apikey;
mod ip_reputation;
mod user;

pub use abuse_event::AbuseEventRepository;
pub use apikey::ApiKeyRepository;
pub use ip_reputation::IpReputationRepository;
pub use user::UserRepository;
