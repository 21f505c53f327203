pub mod client;
mod memory;
mod postgres;
mod record;

pub use client::{DbClient, DbError};
