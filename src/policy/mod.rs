//! Retention policy: free-space tiers and the rotation limits they select.

pub mod retention;
