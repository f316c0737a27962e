//! Cascade Core
//!
//! Core types and abstractions for the Cascade pipeline orchestration engine.
//!
//! This crate contains:
//! - Domain types: workflows, tasks, data references, blueprints, the
//!   execution graph, and dockerinfo endpoint resolution
//! - DTOs: wire shapes for the submission API and the service control
//!   interface
//! - The error taxonomy shared by the worker loop and the coordinator

pub mod domain;
pub mod dto;
pub mod error;
