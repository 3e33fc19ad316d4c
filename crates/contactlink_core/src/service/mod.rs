//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate identity components into use-case level APIs.
//! - Keep callers decoupled from storage details.

pub mod identity_service;
