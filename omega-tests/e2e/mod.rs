//! End-to-end tests for VOID Omega
//!
//! These tests run the production adapters against a local stub of the
//! upstream services and drive the tool server the way a client would.

mod discovery_workflow;
