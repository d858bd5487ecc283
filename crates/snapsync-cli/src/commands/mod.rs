//! CLI subcommands

pub mod auth;
pub mod capture;
pub mod completions;
pub mod context;
pub mod delete;
pub mod feed;
pub mod images;
pub mod private;
pub mod status;
pub mod upload;
