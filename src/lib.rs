pub mod catalog;
pub mod config;
pub mod db;
pub mod feed;
pub mod mailer;
pub mod model;
pub mod notify;
pub mod roster;
pub mod scoring;
pub mod slug;
pub mod tz;
