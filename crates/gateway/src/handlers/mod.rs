//! API handlers module

pub mod graphs;
pub mod health;
pub mod nodes;
pub mod relationships;
