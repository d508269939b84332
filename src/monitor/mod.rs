//! Filesystem monitoring: free-space sampling for the retention policy.

pub mod probe;
