// tests/integration_test.rs

//! End-to-end scenarios driven over real loopback HTTP against one or more
//! `cplane` nodes.

mod integration {
    pub mod scenarios_test;
    pub mod test_helpers;
}
