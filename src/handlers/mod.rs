pub mod auth;
pub mod campaigns;
pub mod clients;
pub mod reports;
pub mod users;
