//! Integration tests for Sumi-Archiver

mod crawl_tests;
mod queue_tests;
