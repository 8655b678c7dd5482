//! # Analysis Module
//!
//! This module contains the analyses the optimization passes are built on:
//! dominance, derived use chains, and allocation escape classification.

pub mod alias;
pub mod dominance;
pub mod use_chains;


pub use alias::{classify_allocations, AliasIdentity, AliasMap};
pub use dominance::{compute_dominator_tree, dominates, DominatorTree};
pub use use_chains::{DefSite, UseChains, UsePosition, UseSite};
