//! Cross-crate integration tests for sceptre.
//!
//! The library itself is empty; everything lives in `tests/`, where the
//! whole pipeline — reader, resolver, translator, engine — is driven
//! through its public API.
