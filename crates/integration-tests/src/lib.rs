//! End-to-end tests live in `tests/`; this crate exports nothing.
