//! Gateway integration-style tests

mod test_utils;
