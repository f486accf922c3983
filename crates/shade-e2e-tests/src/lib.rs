//! End-to-end tests for the shade pipeline live in `tests/`.
