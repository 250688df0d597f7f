//! Register maps per controller family

pub mod mca3k;
