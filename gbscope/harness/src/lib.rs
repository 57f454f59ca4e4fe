//! Test-only workspace member; everything of interest lives in `tests/`.
