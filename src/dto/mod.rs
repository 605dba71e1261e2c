pub mod auth;
pub mod cart;
pub mod categories;
pub mod contact;
pub mod orders;
pub mod products;
pub mod settings;
pub mod stats;
pub mod upload;
pub mod users;
