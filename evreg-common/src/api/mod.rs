//! API primitives shared by evreg services

pub mod auth;
