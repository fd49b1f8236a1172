//! Library crate for policy-portal-back, exposing the storage connection lifecycle to binaries and tests.

pub mod config;
pub mod dao;
mod dto;
pub mod lifecycle;
pub mod routes;
pub mod services;
pub mod state;
