pub mod address;
pub mod aggregate;
pub mod api;
pub mod config;
pub mod contract;
pub mod conversation;
pub mod eth;
pub mod models;
pub mod price;
pub mod report;
pub mod service;
