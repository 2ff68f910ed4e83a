//! Model binding, validation exclusion and compiled view caching for an MVC
//! request pipeline.

pub mod binding;
pub mod compilation;
pub mod config;
pub mod infra;
pub mod metadata;
pub mod validation;
