//! HTTP gateway in front of external diagram and markup renderers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
