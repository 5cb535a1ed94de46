// tests/property_test.rs

//! Property-based tests verifying the invariants from SPEC_FULL.md's
//! "testable properties" section.

mod property {
    pub mod invariants_test;
}
