//! Integration tests for VOID Omega
//!
//! These tests drive the resolver and the assistant together through the
//! scripted providers, checking how the tiers and the tool loop interact.

#[path = "integration/grounded_chat.rs"]
mod grounded_chat;
#[path = "integration/resolution_fallback.rs"]
mod resolution_fallback;
