//! Integration test entry point; the suites live under `tests/integration/`.

mod integration;
