//! Tests for template engine
//!
//! Organized by pipeline stage, then by rendering feature.

use super::*;

// Test helper functions
mod helpers;

// Tokenizer tests
mod modes;


mod control_flow;
