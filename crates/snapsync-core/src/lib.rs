//! SnapSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Item`, `FeedList`, `UserInfo`, user partitions
//! - **Reconciliation** - pure merge functions producing [`domain::feed::FeedDiff`]s
//! - **Port definitions** - Traits for adapters: `ITokenSource`, `IPicsBackend`,
//!   `ISettingsStore`, `IPageCache`, `IFeedListener`
//! - **Configuration** - YAML-backed [`config::Config`]
//!
//! # Architecture
//!
//! The domain module contains pure logic with no I/O. Ports define trait
//! interfaces that adapter crates (`snapsync-remote`, `snapsync-cache`)
//! implement, and `snapsync-sync` drives them.

pub mod config;
pub mod domain;
pub mod ports;
